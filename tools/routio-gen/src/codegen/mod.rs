// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Code emitters: deterministically render target-language source from
//! the type registry.
//!
//! Both back-ends produce one source file with the same three regions:
//! prologue (guard/docstring plus aggregated dependencies), type region
//! (enums, forward declarations, structure bodies), and serialization
//! region (read/write pairs plus hash-labeled publisher/subscriber
//! bindings per message). Output is byte-identical for a given input.

pub mod cpp;
pub mod python;
pub mod type_hash;

use std::path::Path;

use crate::ast::Description;
use crate::error::DescriptionError;
use crate::registry::{Language, TypeRegistry};

/// Build the registry and render one output file.
///
/// `basename` labels the output (header guard); `file` positions
/// registration errors.
pub fn generate(
    desc: &Description,
    language: Language,
    basename: &str,
    file: &str,
) -> Result<String, DescriptionError> {
    let registry = TypeRegistry::from_description(desc, file)?;
    Ok(match language {
        Language::Cpp => cpp::generate(&registry, basename),
        Language::Python => python::generate(&registry),
    })
}

/// Derive the output filename: strip directory and extension, append the
/// language's extension.
pub fn output_filename(input: &str, language: Language) -> String {
    let base = Path::new(input)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string());
    format!("{base}.{}", language.file_extension())
}
