// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Python back-end.
//!
//! Emits one module: imports, the enum helper, one enum and registration
//! per enumerate, registrations for external types with read/write hooks,
//! one class per structure with static `read`/`write` methods, and a
//! hash-labeled subscriber/publisher pair per message.

use crate::ast::{Field, Value};
use crate::printer::format_number;
use crate::registry::{Language, TypeRegistry};

/// Render the complete Python module for a registry.
pub fn generate(registry: &TypeRegistry) -> String {
    let mut out = String::new();

    out.push_str(&header());
    out.push_str(&imports(registry));
    out.push_str(&enum_helper());
    out.push_str(&enums(registry));
    out.push_str(&external_registrations(registry));
    out.push_str(&classes(registry));
    out.push_str(&message_bindings(registry));

    out
}

fn header() -> String {
    "# This is an autogenerated file, do not modify!\n\
     from __future__ import absolute_import\n\
     from __future__ import division\n\
     from __future__ import print_function\n\
     from __future__ import unicode_literals\n\n\
     from builtins import super\n\n"
        .to_string()
}

fn imports(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    let sources = registry.sources(Language::Python);
    for src in &sources {
        out.push_str(&format!("import {src}\n"));
    }
    if !sources.is_empty() {
        out.push('\n');
    }
    out
}

fn enum_helper() -> String {
    let mut out = String::new();
    out.push_str("def enum(name, enums):\n");
    out.push_str("    reverse = dict((value, key) for key, value in enums.items())\n");
    out.push_str("    enums[\"str\"] = staticmethod(lambda x: reverse[x])\n");
    out.push_str("    return type(name, (), enums)\n\n");
    out.push_str("def enum_conversion(enum, obj):\n");
    out.push_str("    if isinstance(obj, int):\n");
    out.push_str("        return obj\n");
    out.push_str("    if isinstance(obj, str):\n");
    out.push_str("        return getattr(enum, obj)\n");
    out.push_str("    return 0\n\n");
    out
}

fn enums(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    for def in registry.enums() {
        let members: Vec<String> = def
            .members
            .iter()
            .enumerate()
            .map(|(ordinal, member)| format!("'{member}' : {ordinal}"))
            .collect();
        if members.is_empty() {
            out.push_str(&format!("{0} = enum(\"{0}\", {{ }})\n\n", def.name));
        } else {
            out.push_str(&format!(
                "{0} = enum(\"{0}\", {{ {1} }})\n\n",
                def.name,
                members.join(", ")
            ));
        }

        out.push_str(&format!(
            "routio.registerType({0}, lambda x: x.readInt(), lambda x, o: x.writeInt(o), \
             lambda x: enum_conversion({0}, x))\n\n",
            def.name
        ));
    }
    out
}

fn external_registrations(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    let mut any = false;
    for meta in registry.types() {
        let spec = meta.lang(Language::Python);
        let (Some(reader), Some(writer)) = (&spec.reader, &spec.writer) else {
            continue;
        };
        out.push_str(&format!(
            "routio.registerType({}, {reader}, {writer})\n",
            meta.container(Language::Python)
        ));
        any = true;
    }
    if any {
        out.push('\n');
    }
    out
}

fn python_type(registry: &TypeRegistry, field: &Field) -> String {
    registry
        .get(&field.type_name)
        .map(|meta| meta.container(Language::Python).to_string())
        .unwrap_or_else(|| field.type_name.clone())
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

fn literal(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        Value::Str(s) => format!("\"{}\"", escape_string(s)),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
    }
}

/// Default expression for a constructor parameter. Arrays and types
/// without a language default fall back to `None` and are materialized in
/// the constructor body.
fn parameter_default(registry: &TypeRegistry, field: &Field) -> String {
    if let Some(value) = &field.default_value {
        return literal(value);
    }
    if field.array.is_some() {
        return "None".to_string();
    }
    registry
        .get(&field.type_name)
        .and_then(|meta| meta.lang(Language::Python).default.clone())
        .unwrap_or_else(|| "None".to_string())
}

fn classes(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    for def in registry.structs() {
        out.push_str(&format!("class {}(object):\n", def.name));
        out.push_str("    def __init__(self");
        for field in &def.fields {
            out.push_str(&format!(
                ",\n        {} = {}",
                field.name,
                parameter_default(registry, field)
            ));
        }
        out.push_str("):\n");

        for field in &def.fields {
            if field.array.is_some() {
                out.push_str(&format!("        if {} is None:\n", field.name));
                out.push_str(&format!("            self.{} = []\n", field.name));
                out.push_str("        else:\n");
                out.push_str(&format!("            self.{0} = {0}\n", field.name));
            } else if parameter_default(registry, field) == "None" {
                out.push_str(&format!("        if {} is None:\n", field.name));
                out.push_str(&format!(
                    "            self.{} = {}()\n",
                    field.name,
                    python_type(registry, field)
                ));
                out.push_str("        else:\n");
                out.push_str(&format!("            self.{0} = {0}\n", field.name));
            } else {
                out.push_str(&format!("        self.{0} = {0}\n", field.name));
            }
        }
        out.push_str("        pass\n\n");

        out.push_str("    @staticmethod\n    def read(reader):\n");
        out.push_str(&format!("        dst = {}()\n", def.name));
        for field in &def.fields {
            let ty = python_type(registry, field);
            if field.array.is_some() {
                out.push_str(&format!(
                    "        dst.{} = routio.readList({ty}, reader)\n",
                    field.name
                ));
            } else {
                out.push_str(&format!(
                    "        dst.{} = routio.readType({ty}, reader)\n",
                    field.name
                ));
            }
        }
        out.push_str("        return dst\n\n");

        out.push_str("    @staticmethod\n    def write(writer, obj):\n");
        for field in &def.fields {
            let ty = python_type(registry, field);
            if field.array.is_some() {
                out.push_str(&format!(
                    "        routio.writeList({ty}, writer, obj.{})\n",
                    field.name
                ));
            } else {
                out.push_str(&format!(
                    "        routio.writeType({ty}, writer, obj.{})\n",
                    field.name
                ));
            }
        }
        out.push_str("        pass\n\n");

        out.push_str(&format!(
            "routio.registerType({0}, {0}.read, {0}.write)\n\n",
            def.name
        ));
    }
    out
}

fn message_bindings(registry: &TypeRegistry) -> String {
    let mut out = String::new();
    for name in registry.messages() {
        let hash = registry.hash_of(name);

        out.push_str(&format!("class {name}Subscriber(routio.Subscriber):\n\n"));
        out.push_str("    def __init__(self, client, alias, callback):\n");
        out.push_str("        def _read(message):\n");
        out.push_str("            reader = routio.MessageReader(message)\n");
        out.push_str(&format!("            return {name}.read(reader)\n\n"));
        out.push_str(&format!(
            "        super({name}Subscriber, self).__init__(client, alias, \"{hash}\", lambda x: callback(_read(x)))\n\n\n"
        ));

        out.push_str(&format!("class {name}Publisher(routio.Publisher):\n\n"));
        out.push_str("    def __init__(self, client, alias):\n");
        out.push_str(&format!(
            "        super({name}Publisher, self).__init__(client, alias, \"{hash}\")\n\n"
        ));
        out.push_str("    def send(self, obj):\n");
        out.push_str("        writer = routio.MessageWriter()\n");
        out.push_str(&format!("        {name}.write(writer, obj)\n"));
        out.push_str(&format!("        super({name}Publisher, self).send(writer)\n\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    const DEMO: &str = "namespace demo;\n\
                        enumerate Color { RED, GREEN, BLUE }\n\
                        message Point { float32 x; float32 y; Color c = 0; }";

    fn generate_demo() -> String {
        let desc = parse(DEMO, "<test>").unwrap();
        let registry = TypeRegistry::from_description(&desc, "<test>").unwrap();
        generate(&registry)
    }

    #[test]
    fn test_deterministic_output() {
        assert_eq!(generate_demo(), generate_demo());
    }

    #[test]
    fn test_header_and_imports() {
        let out = generate_demo();
        assert!(out.starts_with("# This is an autogenerated file"));
        assert!(out.contains("from __future__ import unicode_literals"));
        assert!(out.contains("import routio\n"));
        assert!(out.contains("import datetime\n"));
        assert!(out.contains("import numpy\n"));
        // No C++ headers leak into the Python imports.
        assert!(!out.contains("import vector"));
        assert!(!out.contains("routio/datatypes.h"));
    }

    #[test]
    fn test_enum_declaration_order() {
        let out = generate_demo();
        assert!(out.contains("Color = enum(\"Color\", { 'RED' : 0, 'GREEN' : 1, 'BLUE' : 2 })"));
        assert!(out.contains(
            "routio.registerType(Color, lambda x: x.readInt(), lambda x, o: x.writeInt(o), \
             lambda x: enum_conversion(Color, x))"
        ));
    }

    #[test]
    fn test_class_read_write_and_registration() {
        let out = generate_demo();
        assert!(out.contains("class Point(object):"));
        assert!(out.contains("dst.x = routio.readType(float, reader)"));
        assert!(out.contains("dst.c = routio.readType(Color, reader)"));
        assert!(out.contains("routio.writeType(float, writer, obj.y)"));
        assert!(out.contains("routio.registerType(Point, Point.read, Point.write)"));
    }

    #[test]
    fn test_field_order_preserved() {
        let out = generate_demo();
        let read_pos = out.find("def read(reader):").unwrap();
        let x = out[read_pos..].find("dst.x").unwrap();
        let y = out[read_pos..].find("dst.y").unwrap();
        let c = out[read_pos..].find("dst.c").unwrap();
        assert!(x < y && y < c);
    }

    #[test]
    fn test_message_bindings_carry_hash() {
        let desc = parse(DEMO, "<test>").unwrap();
        let registry = TypeRegistry::from_description(&desc, "<test>").unwrap();
        let hash = registry.hash_of("Point");
        let out = generate(&registry);
        assert!(out.contains("class PointSubscriber(routio.Subscriber):"));
        assert!(out.contains("class PointPublisher(routio.Publisher):"));
        assert_eq!(out.matches(hash.as_str()).count(), 2);
    }

    #[test]
    fn test_array_fields_use_lists() {
        let desc = parse("structure Buf { float32[] samples; }", "<test>").unwrap();
        let registry = TypeRegistry::from_description(&desc, "<test>").unwrap();
        let out = generate(&registry);
        assert!(out.contains("samples = None"));
        assert!(out.contains("self.samples = []"));
        assert!(out.contains("routio.readList(float, reader)"));
    }

    #[test]
    fn test_nested_struct_default_materialized() {
        let desc = parse(
            "structure Inner { int32 a; }\nmessage Outer { Inner i; }",
            "<test>",
        )
        .unwrap();
        let registry = TypeRegistry::from_description(&desc, "<test>").unwrap();
        let out = generate(&registry);
        assert!(out.contains("i = None"));
        assert!(out.contains("self.i = Inner()"));
    }

    #[test]
    fn test_external_registration() {
        let desc = parse(
            r#"external Mat (
                language python "numpy.ndarray" from "cv2" read "cv2.readMat" write "cv2.writeMat";
            );"#,
            "<test>",
        )
        .unwrap();
        let registry = TypeRegistry::from_description(&desc, "<test>").unwrap();
        let out = generate(&registry);
        assert!(out.contains("import cv2\n"));
        assert!(out.contains("routio.registerType(numpy.ndarray, cv2.readMat, cv2.writeMat)"));
    }
}
