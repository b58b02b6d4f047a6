// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Type registry: the compiler's symbol table.
//!
//! Seeded with the built-in types at construction, populated in
//! AST-declaration order, then read-only during emission. Declaration
//! order is preserved everywhere so serializer field order is
//! deterministic and matches the hash input.
//!
//! Every registered type carries a 128-bit content digest rendered as 32
//! lowercase hex characters; for messages that digest is the type tag the
//! router checks on the wire.

use std::collections::HashMap;

use crate::ast::{Decl, Description, External, Field};
use crate::codegen::type_hash::type_digest;
use crate::error::{DescriptionError, ErrorKind};

/// Emission target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Cpp,
    Python,
}

impl Language {
    /// Map a `language` keyword from an external declaration.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword {
            "cpp" | "c++" => Some(Self::Cpp),
            "python" | "py" => Some(Self::Python),
            _ => None,
        }
    }

    /// Extension of the generated source file.
    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Cpp => "cpp",
            Self::Python => "py",
        }
    }
}

/// Per-language rendering data for one type.
#[derive(Debug, Clone, Default)]
pub struct LangSpec {
    /// Container type name in the target language.
    pub container: String,
    /// Default value literal, if the language has one for this type.
    pub default: Option<String>,
    /// Reader function for external types.
    pub reader: Option<String>,
    /// Writer function for external types.
    pub writer: Option<String>,
    /// Includes/imports this type drags in.
    pub sources: Vec<String>,
}

/// Metadata for one registered type.
#[derive(Debug, Clone)]
pub struct TypeMeta {
    pub name: String,
    /// Content digest, 32 lowercase hex characters.
    pub hash: String,
    pub cpp: LangSpec,
    pub python: LangSpec,
    pub is_builtin: bool,
    pub is_external: bool,
}

impl TypeMeta {
    /// The language-specific view.
    pub fn lang(&self, language: Language) -> &LangSpec {
        match language {
            Language::Cpp => &self.cpp,
            Language::Python => &self.python,
        }
    }

    /// Container name, falling back to the type name itself.
    pub fn container(&self, language: Language) -> &str {
        let spec = self.lang(language);
        if spec.container.is_empty() {
            &self.name
        } else {
            &spec.container
        }
    }
}

/// An enumerate with its members in declaration order; ordinals are the
/// member positions.
#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<String>,
}

/// A structure or message with its fields in declaration order.
#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<Field>,
    pub is_message: bool,
}

/// The symbol table keyed by type name.
#[derive(Debug)]
pub struct TypeRegistry {
    namespace: Option<String>,
    types: Vec<TypeMeta>,
    index: HashMap<String, usize>,
    enums: Vec<EnumDef>,
    structs: Vec<StructDef>,
    messages: Vec<String>,
}

impl TypeRegistry {
    /// Registry seeded with the built-in types.
    pub fn new() -> Self {
        let mut registry = Self {
            namespace: None,
            types: Vec::new(),
            index: HashMap::new(),
            enums: Vec::new(),
            structs: Vec::new(),
            messages: Vec::new(),
        };
        registry.seed_builtins();
        registry
    }

    /// Build a registry from a parsed description, declaration by
    /// declaration. `file` positions any registration error.
    pub fn from_description(
        desc: &Description,
        file: &str,
    ) -> Result<Self, DescriptionError> {
        let mut registry = Self::new();
        registry.namespace = desc.namespace.as_ref().map(|ns| ns.name.clone());

        for decl in &desc.decls {
            match decl {
                Decl::Enumerate(e) => {
                    registry.check_fresh(&e.name, file, e.span)?;
                    registry.register_enum(&e.name, e.values.clone());
                }
                Decl::Structure(s) => {
                    registry.check_fresh(&s.name, file, s.span)?;
                    registry.check_field_types(&s.fields, file)?;
                    registry.register_struct(&s.name, s.fields.clone(), false);
                }
                Decl::Message(m) => {
                    registry.check_fresh(&m.name, file, m.span)?;
                    registry.check_field_types(&m.fields, file)?;
                    registry.register_struct(&m.name, m.fields.clone(), true);
                }
                Decl::External(ext) => {
                    registry.check_fresh(&ext.name, file, ext.span)?;
                    registry.register_external(ext);
                }
                // Resolved by the build system, not the type system.
                Decl::Include(_) | Decl::Import(_) => {}
            }
        }

        Ok(registry)
    }

    /// Namespace of the description, if declared.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// All types in registration order (built-ins first).
    pub fn types(&self) -> &[TypeMeta] {
        &self.types
    }

    /// Look up one type.
    pub fn get(&self, name: &str) -> Option<&TypeMeta> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    /// Digest for a name; unknown names hash as their bare name, matching
    /// external references resolved elsewhere.
    pub fn hash_of(&self, name: &str) -> String {
        match self.get(name) {
            Some(meta) => meta.hash.clone(),
            None => type_digest(name),
        }
    }

    /// User enums in declaration order.
    pub fn enums(&self) -> &[EnumDef] {
        &self.enums
    }

    /// User structures and messages in declaration order.
    pub fn structs(&self) -> &[StructDef] {
        &self.structs
    }

    /// Message names in declaration order.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// True if `name` is a user enum.
    pub fn is_enum(&self, name: &str) -> bool {
        self.enums.iter().any(|e| e.name == name)
    }

    /// Aggregated includes/imports for one language: the language's
    /// baseline list, then every type's sources in registration order,
    /// deduplicated in first-seen order.
    pub fn sources(&self, language: Language) -> Vec<String> {
        let mut out: Vec<String> = match language {
            Language::Cpp => ["vector", "array", "chrono", "routio/datatypes.h"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            Language::Python => ["routio", "datetime", "numpy"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        };
        for meta in &self.types {
            for src in &meta.lang(language).sources {
                if !out.contains(src) {
                    out.push(src.clone());
                }
            }
        }
        out
    }

    // ---- registration ----

    fn check_fresh(
        &self,
        name: &str,
        file: &str,
        span: crate::ast::Span,
    ) -> Result<(), DescriptionError> {
        if self.index.contains_key(name) {
            return Err(DescriptionError::at(
                file,
                span,
                format!("Duplicate type definition: {name}"),
            )
            .with_kind(ErrorKind::DuplicateType));
        }
        Ok(())
    }

    /// Field types resolve against what is already registered, so a field
    /// may only reference earlier declarations (or built-ins).
    fn check_field_types(&self, fields: &[Field], file: &str) -> Result<(), DescriptionError> {
        for field in fields {
            if !self.index.contains_key(&field.type_name) {
                return Err(DescriptionError::at(
                    file,
                    field.span,
                    format!("Unknown type: {}", field.type_name),
                )
                .with_kind(ErrorKind::UnknownType));
            }
        }
        Ok(())
    }

    fn insert(&mut self, meta: TypeMeta) {
        self.index.insert(meta.name.clone(), self.types.len());
        self.types.push(meta);
    }

    fn register_enum(&mut self, name: &str, members: Vec<String>) {
        // The digest covers the name and each member name in order.
        let mut content = name.to_string();
        for member in &members {
            content.push_str(member);
        }
        self.insert(TypeMeta {
            name: name.to_string(),
            hash: type_digest(&content),
            cpp: LangSpec {
                container: name.to_string(),
                ..Default::default()
            },
            python: LangSpec {
                container: name.to_string(),
                ..Default::default()
            },
            is_builtin: false,
            is_external: false,
        });
        self.enums.push(EnumDef {
            name: name.to_string(),
            members,
        });
    }

    fn register_struct(&mut self, name: &str, fields: Vec<Field>, is_message: bool) {
        // The digest covers the name and each field's type and name in
        // declaration order; nested types contribute their bare names.
        let mut content = name.to_string();
        for field in &fields {
            content.push_str(&field.type_name);
            content.push_str(&field.name);
        }
        self.insert(TypeMeta {
            name: name.to_string(),
            hash: type_digest(&content),
            cpp: LangSpec {
                container: name.to_string(),
                ..Default::default()
            },
            python: LangSpec {
                container: name.to_string(),
                ..Default::default()
            },
            is_builtin: false,
            is_external: false,
        });
        self.structs.push(StructDef {
            name: name.to_string(),
            fields,
            is_message,
        });
        if is_message {
            self.messages.push(name.to_string());
        }
    }

    fn register_external(&mut self, ext: &External) {
        let mut meta = TypeMeta {
            name: ext.name.clone(),
            hash: type_digest(&ext.name),
            cpp: LangSpec::default(),
            python: LangSpec::default(),
            is_builtin: false,
            is_external: true,
        };
        for lang in &ext.languages {
            let Some(language) = Language::from_keyword(&lang.language) else {
                // Entries for languages this compiler does not target are
                // carried in the AST but contribute nothing.
                continue;
            };
            let spec = match language {
                Language::Cpp => &mut meta.cpp,
                Language::Python => &mut meta.python,
            };
            spec.container = lang.container.clone();
            spec.default = lang.default.clone();
            spec.reader = lang.read.clone();
            spec.writer = lang.write.clone();
            spec.sources = lang.sources.clone();
        }
        self.insert(meta);
    }

    fn seed_builtins(&mut self) {
        let numeric = |name: &str, cpp: &str, py: &str| TypeMeta {
            name: name.to_string(),
            hash: type_digest(name),
            cpp: LangSpec {
                container: cpp.to_string(),
                default: Some("0".to_string()),
                ..Default::default()
            },
            python: LangSpec {
                container: py.to_string(),
                default: Some("0".to_string()),
                ..Default::default()
            },
            is_builtin: true,
            is_external: false,
        };
        let float = |name: &str, cpp: &str, py: &str, cpp_default: &str| TypeMeta {
            name: name.to_string(),
            hash: type_digest(name),
            cpp: LangSpec {
                container: cpp.to_string(),
                default: Some(cpp_default.to_string()),
                ..Default::default()
            },
            python: LangSpec {
                container: py.to_string(),
                default: Some("0.0".to_string()),
                ..Default::default()
            },
            is_builtin: true,
            is_external: false,
        };

        self.insert(numeric("int8", "int8_t", "int"));
        self.insert(numeric("int16", "int16_t", "int"));
        self.insert(numeric("int32", "int32_t", "int"));
        self.insert(numeric("int64", "int64_t", "routio.long"));
        self.insert(numeric("uint8", "uint8_t", "int"));
        self.insert(numeric("uint16", "uint16_t", "int"));
        self.insert(numeric("uint32", "uint32_t", "int"));
        self.insert(numeric("uint64", "uint64_t", "int"));
        self.insert(float("float32", "float", "float", "0.0f"));
        self.insert(float("float64", "double", "routio.double", "0.0"));

        self.insert(TypeMeta {
            name: "bool".to_string(),
            hash: type_digest("bool"),
            cpp: LangSpec {
                container: "bool".to_string(),
                default: Some("false".to_string()),
                ..Default::default()
            },
            python: LangSpec {
                container: "bool".to_string(),
                default: Some("False".to_string()),
                ..Default::default()
            },
            is_builtin: true,
            is_external: false,
        });

        self.insert(TypeMeta {
            name: "string".to_string(),
            hash: type_digest("string"),
            cpp: LangSpec {
                container: "std::string".to_string(),
                default: Some("\"\"".to_string()),
                sources: vec!["string".to_string()],
                ..Default::default()
            },
            python: LangSpec {
                container: "str".to_string(),
                default: Some("\"\"".to_string()),
                ..Default::default()
            },
            is_builtin: true,
            is_external: false,
        });

        // Convenience aliases.
        self.insert(numeric("int", "int32_t", "int"));
        self.insert(float("float", "float", "float", "0.0f"));
        self.insert(float("double", "double", "routio.double", "0.0"));

        self.insert(TypeMeta {
            name: "char".to_string(),
            hash: type_digest("char"),
            cpp: LangSpec {
                container: "char".to_string(),
                default: Some("'\\0'".to_string()),
                ..Default::default()
            },
            python: LangSpec {
                container: "routio.char".to_string(),
                default: Some("'\\0'".to_string()),
                ..Default::default()
            },
            is_builtin: true,
            is_external: false,
        });

        self.insert(TypeMeta {
            name: "timestamp".to_string(),
            hash: type_digest("timestamp"),
            cpp: LangSpec {
                container: "std::chrono::system_clock::time_point".to_string(),
                sources: vec!["chrono".to_string()],
                ..Default::default()
            },
            python: LangSpec {
                container: "datetime.datetime".to_string(),
                sources: vec!["datetime".to_string()],
                ..Default::default()
            },
            is_builtin: true,
            is_external: false,
        });

        self.insert(TypeMeta {
            name: "header".to_string(),
            hash: type_digest("header"),
            cpp: LangSpec {
                container: "routio::Header".to_string(),
                default: Some("routio::Header()".to_string()),
                sources: vec!["routio/datatypes.h".to_string()],
                ..Default::default()
            },
            python: LangSpec {
                container: "routio.Header".to_string(),
                default: Some("routio.Header()".to_string()),
                ..Default::default()
            },
            is_builtin: true,
            is_external: false,
        });

        self.insert(TypeMeta {
            name: "array".to_string(),
            hash: type_digest("array"),
            cpp: LangSpec {
                container: "routio::Array".to_string(),
                default: Some("routio::Array()".to_string()),
                sources: vec!["vector".to_string(), "routio/array.h".to_string()],
                ..Default::default()
            },
            python: LangSpec {
                container: "numpy.ndarray".to_string(),
                default: Some("numpy.zeros((0,))".to_string()),
                sources: vec!["numpy".to_string()],
                ..Default::default()
            },
            is_builtin: true,
            is_external: false,
        });

        self.insert(TypeMeta {
            name: "tensor".to_string(),
            hash: type_digest("tensor"),
            cpp: LangSpec {
                container: "routio::Tensor".to_string(),
                default: Some("routio::Tensor()".to_string()),
                sources: vec!["vector".to_string(), "routio/array.h".to_string()],
                ..Default::default()
            },
            python: LangSpec {
                container: "numpy.ndarray".to_string(),
                default: Some("numpy.zeros((0,))".to_string()),
                sources: vec!["numpy".to_string()],
                ..Default::default()
            },
            is_builtin: true,
            is_external: false,
        });
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
