// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! C++ back-end.
//!
//! Emits one self-contained header: guard and includes, codec
//! specializations for external types, the user namespace with enums and
//! classes, then `read`/`write` specializations and per-message
//! pack/unpack plus publisher/subscriber bindings in the `routio`
//! namespace.

use crate::ast::{Field, Value};
use crate::printer::format_number;
use crate::registry::{Language, TypeRegistry};

/// Render the complete C++ header for a registry.
pub fn generate(registry: &TypeRegistry, basename: &str) -> String {
    let mut out = String::new();
    let ns = cpp_namespace(registry);

    out.push_str("// This is an autogenerated file, do not modify!\n\n");
    out.push_str(&header_guard_open(basename));
    out.push_str(&includes(registry));

    out.push_str("\nnamespace routio {\n\n");
    out.push_str(&external_specializations(registry));
    out.push_str("}\n\n");

    out.push_str(&namespace_open(registry));
    out.push_str(&enums(registry));
    out.push_str(&forward_declarations(registry));
    out.push_str(&classes(registry));
    out.push_str(&namespace_close(registry));

    out.push_str("\nnamespace routio {\n\n");
    out.push_str(&enum_serializers(registry, &ns));
    out.push_str(&struct_serializers(registry, &ns));
    out.push_str(&message_bindings(registry, &ns));
    out.push_str("}\n\n");

    out.push_str("#endif\n");
    out
}

fn header_guard_open(basename: &str) -> String {
    let guard: String = basename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("#ifndef __{guard}_MSGS_H\n#define __{guard}_MSGS_H\n\n")
}

fn includes(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    for src in registry.sources(Language::Cpp) {
        out.push_str(&format!("#include <{src}>\n"));
    }
    out
}

/// Fully qualified prefix for user types, `::a::b::`, or empty when no
/// namespace was declared.
fn cpp_namespace(registry: &TypeRegistry) -> String {
    match registry.namespace() {
        None => String::new(),
        Some(ns) => {
            let joined = ns.split('.').collect::<Vec<_>>().join("::");
            format!("::{joined}::")
        }
    }
}

fn namespace_open(registry: &TypeRegistry) -> String {
    let Some(ns) = registry.namespace() else {
        return String::new();
    };
    let mut out = String::new();
    for part in ns.split('.') {
        out.push_str(&format!("namespace {part} {{\n"));
    }
    out.push('\n');
    out
}

fn namespace_close(registry: &TypeRegistry) -> String {
    let Some(ns) = registry.namespace() else {
        return String::new();
    };
    let mut out = String::new();
    for _ in ns.split('.') {
        out.push_str("}\n");
    }
    out
}

/// Codec specializations for external types carrying read/write hooks.
fn external_specializations(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    for meta in registry.types() {
        let spec = meta.lang(Language::Cpp);
        let (Some(reader), Some(writer)) = (&spec.reader, &spec.writer) else {
            continue;
        };
        let container = meta.container(Language::Cpp);
        out.push_str(&format!(
            "template <> inline void read(MessageReader& reader, {container}& dst) {{\n\
             \tdst = {reader}(reader);\n\
             }}\n\n"
        ));
        out.push_str(&format!(
            "template <> inline void write(MessageWriter& writer, const {container}& src) {{\n\
             \t{writer}(writer, src);\n\
             }}\n\n"
        ));
    }
    out
}

fn enum_constant(enum_name: &str, member: &str) -> String {
    format!("{}_{member}", enum_name.to_uppercase())
}

fn enums(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    for def in registry.enums() {
        let constants: Vec<String> = def
            .members
            .iter()
            .map(|m| enum_constant(&def.name, m))
            .collect();
        if constants.is_empty() {
            out.push_str(&format!("enum {} {{ }};\n\n", def.name));
        } else {
            out.push_str(&format!(
                "enum {} {{ {} }};\n\n",
                def.name,
                constants.join(", ")
            ));
        }
    }
    out
}

fn forward_declarations(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    for def in registry.structs() {
        out.push_str(&format!("class {};\n", def.name));
    }
    if !registry.structs().is_empty() {
        out.push('\n');
    }
    out
}

fn field_type(registry: &TypeRegistry, field: &Field) -> String {
    let base = registry
        .get(&field.type_name)
        .map(|meta| meta.container(Language::Cpp).to_string())
        .unwrap_or_else(|| field.type_name.clone());

    match &field.array {
        Some(array) => match array.length {
            Some(len) => format!("std::array<{base}, {len}>"),
            None => format!("std::vector<{base}>"),
        },
        None => base,
    }
}

fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
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
    out
}

fn literal(registry: &TypeRegistry, field: &Field, value: &Value) -> String {
    match value {
        // Enum-typed fields take their numeric default through a cast so
        // the generated header compiles.
        Value::Number(n) if registry.is_enum(&field.type_name) => {
            format!("static_cast<{}>({})", field.type_name, format_number(*n))
        }
        Value::Number(n) => format_number(*n),
        Value::Str(s) => format!("\"{}\"", escape_string(s)),
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
    }
}

fn default_value(registry: &TypeRegistry, field: &Field) -> String {
    if let Some(value) = &field.default_value {
        return literal(registry, field, value);
    }

    if let Some(array) = &field.array {
        let base = registry
            .get(&field.type_name)
            .map(|meta| meta.container(Language::Cpp).to_string())
            .unwrap_or_else(|| field.type_name.clone());
        return match array.length {
            Some(_) => "{}".to_string(),
            None => format!("std::vector<{base}>()"),
        };
    }

    if let Some(meta) = registry.get(&field.type_name) {
        if let Some(default) = &meta.lang(Language::Cpp).default {
            return default.clone();
        }
        return format!("{}()", meta.container(Language::Cpp));
    }
    format!("{}()", field.type_name)
}

fn classes(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    for def in registry.structs() {
        out.push_str(&format!("class {} {{\npublic:\n", def.name));

        // Constructor with defaulted arguments in declaration order.
        out.push_str(&format!("\t{}(", def.name));
        if def.fields.is_empty() {
            out.push_str(") {\n");
        } else {
            out.push('\n');
            let params: Vec<String> = def
                .fields
                .iter()
                .map(|f| {
                    format!(
                        "\t\t{} {} = {}",
                        field_type(registry, f),
                        f.name,
                        default_value(registry, f)
                    )
                })
                .collect();
            out.push_str(&params.join(",\n"));
            out.push_str("\n\t) {\n");
        }
        for field in &def.fields {
            out.push_str(&format!("\t\tthis->{0} = {0};\n", field.name));
        }
        out.push_str("\t}\n\n");

        out.push_str(&format!("\tvirtual ~{}() {{}}\n\n", def.name));

        for field in &def.fields {
            out.push_str(&format!(
                "\t{} {};\n",
                field_type(registry, field),
                field.name
            ));
        }
        out.push_str("};\n\n");
    }
    out
}

fn enum_serializers(registry: &TypeRegistry, ns: &str) -> String {
    let mut out = String::new();
    for def in registry.enums() {
        out.push_str(&format!(
            "template <> inline void read(MessageReader& reader, {ns}{}& dst) {{\n",
            def.name
        ));
        out.push_str("\tswitch (reader.read<int>()) {\n");
        for (ordinal, member) in def.members.iter().enumerate() {
            out.push_str(&format!(
                "\tcase {ordinal}: dst = {ns}{}; break;\n",
                enum_constant(&def.name, member)
            ));
        }
        out.push_str("\t}\n}\n\n");

        out.push_str(&format!(
            "template <> inline void write(MessageWriter& writer, const {ns}{}& src) {{\n",
            def.name
        ));
        out.push_str("\tswitch (src) {\n");
        for (ordinal, member) in def.members.iter().enumerate() {
            out.push_str(&format!(
                "\tcase {ns}{}: writer.write<int>({ordinal}); return;\n",
                enum_constant(&def.name, member)
            ));
        }
        out.push_str("\t}\n}\n\n");
    }
    out
}

fn struct_serializers(registry: &TypeRegistry, ns: &str) -> String {
    let mut out = String::new();
    for def in registry.structs() {
        out.push_str(&format!(
            "template <> inline void read(MessageReader& reader, {ns}{}& dst) {{\n",
            def.name
        ));
        for field in &def.fields {
            out.push_str(&format!("\tread(reader, dst.{});\n", field.name));
        }
        out.push_str("}\n\n");

        out.push_str(&format!(
            "template <> inline void write(MessageWriter& writer, const {ns}{}& src) {{\n",
            def.name
        ));
        for field in &def.fields {
            out.push_str(&format!("\twrite(writer, src.{});\n", field.name));
        }
        out.push_str("}\n\n");
    }
    out
}

/// Per-message identity, pack/unpack, and the typed publisher/subscriber
/// pair carrying the digest.
fn message_bindings(registry: &TypeRegistry, ns: &str) -> String {
    let mut out = String::new();
    for name in registry.messages() {
        let hash = registry.hash_of(name);
        let qualified = format!("{ns}{name}");

        out.push_str(&format!(
            "template <> inline string get_type_identifier<{qualified}>() {{ return string(\"{hash}\"); }}\n\n"
        ));

        out.push_str(&format!(
            "template<> inline shared_ptr<Message> Message::pack<{qualified}>(const {qualified} &data) {{\n\
             \tMessageWriter writer;\n\
             \twrite(writer, data);\n\
             \treturn make_shared<BufferedMessage>(writer);\n\
             }}\n\n"
        ));

        out.push_str(&format!(
            "template<> inline shared_ptr<{qualified}> Message::unpack<{qualified}>(SharedMessage message) {{\n\
             \tMessageReader reader(message);\n\
             \tshared_ptr<{qualified}> result(new {qualified}());\n\
             \tread(reader, *result);\n\
             \treturn result;\n\
             }}\n\n"
        ));

        out.push_str(&format!(
            "class {name}Publisher : public Publisher {{\n\
             public:\n\
             \t{name}Publisher(SharedClient client, const string &alias)\n\
             \t\t: Publisher(client, alias, get_type_identifier<{qualified}>()) {{}}\n\
             \n\
             \tbool send(const {qualified} &data) {{\n\
             \t\treturn Publisher::send_message(Message::pack<{qualified}>(data));\n\
             \t}}\n\
             }};\n\n"
        ));

        out.push_str(&format!(
            "class {name}Subscriber : public Subscriber {{\n\
             public:\n\
             \t{name}Subscriber(SharedClient client, const string &alias, function<void(shared_ptr<{qualified}>)> callback)\n\
             \t\t: Subscriber(client, alias, get_type_identifier<{qualified}>(),\n\
             \t\t\t[callback](SharedMessage message) {{ callback(Message::unpack<{qualified}>(message)); }}) {{}}\n\
             }};\n\n"
        ));
    }
    out
}
