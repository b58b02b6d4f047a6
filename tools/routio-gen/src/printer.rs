// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Pretty-printer: AST back to description-language text.
//!
//! The output is canonical (fixed indentation and separators) and
//! re-parses to a structurally identical tree, which is what the parser
//! round-trip tests lean on.

use crate::ast::*;

/// Render a description to canonical source text.
pub fn print(desc: &Description) -> String {
    let mut out = String::new();

    if let Some(ns) = &desc.namespace {
        out.push_str("namespace ");
        out.push_str(&ns.name);
        out.push_str(";\n\n");
    }

    for decl in &desc.decls {
        match decl {
            Decl::Enumerate(e) => print_enumerate(&mut out, e),
            Decl::Include(i) => print_include(&mut out, i),
            Decl::Import(i) => {
                out.push_str("import ");
                push_quoted(&mut out, &i.path);
                out.push_str(";\n\n");
            }
            Decl::External(e) => print_external(&mut out, e),
            Decl::Structure(s) => print_fields(&mut out, "structure", &s.name, &s.fields),
            Decl::Message(m) => print_fields(&mut out, "message", &m.name, &m.fields),
        }
    }

    out
}

fn print_enumerate(out: &mut String, e: &Enumerate) {
    out.push_str("enumerate ");
    out.push_str(&e.name);
    if e.values.is_empty() {
        out.push_str(" { }\n\n");
    } else {
        out.push_str(" { ");
        out.push_str(&e.values.join(", "));
        out.push_str(" }\n\n");
    }
}

fn print_include(out: &mut String, i: &Include) {
    out.push_str("include ");
    push_quoted(out, &i.path);
    if let Some(props) = &i.properties {
        out.push(' ');
        push_properties(out, props);
    }
    out.push_str(";\n\n");
}

fn print_external(out: &mut String, e: &External) {
    out.push_str("external ");
    out.push_str(&e.name);
    out.push_str(" (\n");
    for lang in &e.languages {
        out.push_str("    language ");
        out.push_str(&lang.language);
        out.push(' ');
        push_quoted(out, &lang.container);
        if !lang.sources.is_empty() {
            out.push_str(" from");
            for src in &lang.sources {
                out.push(' ');
                push_quoted(out, src);
            }
        }
        if let Some(default) = &lang.default {
            out.push_str(" default ");
            push_quoted(out, default);
        }
        if let (Some(read), Some(write)) = (&lang.read, &lang.write) {
            out.push_str(" read ");
            push_quoted(out, read);
            out.push_str(" write ");
            push_quoted(out, write);
        }
        out.push_str(";\n");
    }
    out.push_str(");\n\n");
}

fn print_fields(out: &mut String, keyword: &str, name: &str, fields: &[Field]) {
    out.push_str(keyword);
    out.push(' ');
    out.push_str(name);
    out.push_str(" {\n");
    for field in fields {
        out.push_str("    ");
        out.push_str(&field.type_name);
        if let Some(array) = &field.array {
            out.push('[');
            if let Some(len) = array.length {
                out.push_str(&len.to_string());
            }
            out.push(']');
        }
        out.push(' ');
        out.push_str(&field.name);
        if let Some(props) = &field.properties {
            out.push(' ');
            push_properties(out, props);
        }
        if let Some(value) = &field.default_value {
            out.push_str(" = ");
            push_value(out, value);
        }
        out.push_str(";\n");
    }
    out.push_str("}\n\n");
}

fn push_properties(out: &mut String, props: &Properties) {
    out.push('(');
    let mut first = true;
    for arg in &props.args {
        if !first {
            out.push_str(" : ");
        }
        push_value(out, arg);
        first = false;
    }
    for kwarg in &props.kwargs {
        if !first {
            out.push_str(" : ");
        }
        out.push_str(&kwarg.name);
        out.push('=');
        push_value(out, &kwarg.value);
        first = false;
    }
    out.push(')');
}

fn push_value(out: &mut String, value: &Value) {
    match value {
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::Str(s) => push_quoted(out, s),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
    }
}

/// Render a number the shortest way that re-parses to the same value.
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

fn push_quoted(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
}
