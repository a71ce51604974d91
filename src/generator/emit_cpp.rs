//! C++ code emitter.
//!
//! Produces one self-contained header per description: enum definitions,
//! struct/class definitions with default-initialized fields and ordered
//! constructors, a read/write serializer pair per struct, and per-message
//! `get_type_identifier`/`pack`/`unpack` specializations that bind the
//! generic typed publisher/subscriber to the computed identifier.
//!
//! Output is deterministic: types are emitted in name order, fields in
//! declaration order.

use std::fmt::Write;

use super::ast::{Description, Field, Value};
use super::registry::TypeRegistry;

/// Generate C++ for a parsed description. `basename` seeds the include
/// guard; pass the output file name or an empty string for stdout.
pub fn emit_cpp(description: &Description, basename: &str) -> String {
    let registry = TypeRegistry::from_description(description);
    let namespace = description.namespace.clone().unwrap_or_default();

    let mut out = String::new();
    out.push_str("// This is an autogenerated file, do not modify!\n\n");

    let guard = guard_name(basename);
    let _ = writeln!(out, "#ifndef __{guard}_MSGS_H");
    let _ = writeln!(out, "#define __{guard}_MSGS_H\n");

    for source in registry.sources("cpp") {
        let _ = writeln!(out, "#include <{source}>");
    }
    if registry.structs().any(|(_, fields)| {
        fields.iter().any(|f| f.array.map(|a| a.length.is_none()).unwrap_or(false))
    }) {
        out.push_str("#include <vector>\n");
    }
    if registry
        .structs()
        .any(|(_, fields)| fields.iter().any(|f| f.array.map(|a| a.length.is_some()).unwrap_or(false)))
    {
        out.push_str("#include <array>\n");
    }

    out.push_str("\nnamespace routio {\n\n");
    emit_external_specializations(&mut out, &registry);
    out.push_str("}\n\n");

    emit_namespace_open(&mut out, &namespace);
    emit_enums(&mut out, &registry);
    emit_forward_declarations(&mut out, &registry);
    emit_structs(&mut out, &registry);
    emit_namespace_close(&mut out, &namespace);

    out.push_str("\nnamespace routio {\n\n");
    emit_enum_serializers(&mut out, &registry, &namespace);
    emit_struct_serializers(&mut out, &registry, &namespace);
    emit_message_specializations(&mut out, &registry, &namespace);
    out.push_str("}\n\n");

    out.push_str("#endif\n");
    out
}

fn guard_name(basename: &str) -> String {
    let stem = basename.rsplit('/').next().unwrap_or(basename);
    let stem = stem.split('.').next().unwrap_or(stem);
    stem.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

fn cpp_namespace_prefix(namespace: &str) -> String {
    if namespace.is_empty() {
        String::new()
    } else {
        format!("::{}::", namespace.replace('.', "::"))
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Number(n) => {
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{n}")
            }
        }
        Value::Text(s) => format!("\"{s}\""),
        Value::Bool(b) => b.to_string(),
    }
}

fn field_type(registry: &TypeRegistry, field: &Field) -> String {
    let base = registry
        .get(&field.type_name)
        .map(|meta| meta.container("cpp").to_string())
        .unwrap_or_else(|| field.type_name.clone());

    match field.array {
        Some(spec) => match spec.length {
            Some(length) => format!("std::array<{base}, {length}>"),
            None => format!("std::vector<{base}>"),
        },
        None => base,
    }
}

fn field_default(registry: &TypeRegistry, field: &Field) -> String {
    if let Some(value) = &field.default {
        return format_value(value);
    }

    if field.array.is_some() {
        return "{}".to_string();
    }

    if let Some(meta) = registry.get(&field.type_name) {
        if let Some(value) = meta.default_value("cpp") {
            return value.to_string();
        }
        return format!("{}()", meta.container("cpp"));
    }
    format!("{}()", field.type_name)
}

fn emit_namespace_open(out: &mut String, namespace: &str) {
    if namespace.is_empty() {
        return;
    }
    for part in namespace.split('.') {
        let _ = writeln!(out, "namespace {part} {{");
    }
    out.push('\n');
}

fn emit_namespace_close(out: &mut String, namespace: &str) {
    if namespace.is_empty() {
        return;
    }
    for _ in namespace.split('.') {
        out.push_str("}\n");
    }
}

fn emit_enums(out: &mut String, registry: &TypeRegistry) {
    for (name, values) in registry.enums() {
        let upper = name.to_uppercase();
        let list = values
            .iter()
            .map(|v| format!("{upper}_{v}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "enum {name} {{ {list} }};\n");
    }
}

fn emit_forward_declarations(out: &mut String, registry: &TypeRegistry) {
    for (name, _) in registry.structs() {
        let _ = writeln!(out, "class {name};");
    }
    out.push('\n');
}

fn emit_structs(out: &mut String, registry: &TypeRegistry) {
    for (name, fields) in registry.structs() {
        let _ = writeln!(out, "class {name} {{");
        out.push_str("public:\n");

        // Constructor with every field defaulted, declaration order.
        let _ = writeln!(out, "\t{name}(");
        let params = fields
            .iter()
            .map(|f| {
                format!(
                    "\t\t{} {} = {}",
                    field_type(registry, f),
                    f.name,
                    field_default(registry, f)
                )
            })
            .collect::<Vec<_>>()
            .join(",\n");
        out.push_str(&params);
        out.push_str("\n\t) {\n");
        for field in fields {
            let _ = writeln!(out, "\t\tthis->{0} = {0};", field.name);
        }
        out.push_str("\t};\n\n");

        let _ = writeln!(out, "\tvirtual ~{name}() {{}};\n");

        for field in fields {
            let _ = writeln!(out, "\t{} {};", field_type(registry, field), field.name);
        }

        out.push_str("};\n\n");
    }
}

fn emit_external_specializations(out: &mut String, registry: &TypeRegistry) {
    for meta in registry.types() {
        let (Some(reader), Some(writer)) = (meta.readers.get("cpp"), meta.writers.get("cpp"))
        else {
            continue;
        };
        let container = meta.container("cpp");

        let _ = writeln!(
            out,
            "template <> inline void read(MessageReader& reader, {container}& dst) {{"
        );
        let _ = writeln!(out, "\tdst = {reader}(reader);");
        out.push_str("}\n\n");

        let _ = writeln!(
            out,
            "template <> inline void write(MessageWriter& writer, const {container}& src) {{"
        );
        let _ = writeln!(out, "\t{writer}(writer, src);");
        out.push_str("}\n\n");
    }
}

fn emit_enum_serializers(out: &mut String, registry: &TypeRegistry, namespace: &str) {
    let prefix = cpp_namespace_prefix(namespace);

    for (name, values) in registry.enums() {
        let upper = name.to_uppercase();

        let _ = writeln!(
            out,
            "template <> inline void read(MessageReader& reader, {prefix}{name}& dst) {{"
        );
        out.push_str("\tswitch (reader.read<int>()) {\n");
        for (index, value) in values.iter().enumerate() {
            let _ = writeln!(out, "\tcase {index}: dst = {prefix}{upper}_{value}; break;");
        }
        out.push_str("\t}\n}\n\n");

        let _ = writeln!(
            out,
            "template <> inline void write(MessageWriter& writer, const {prefix}{name}& src) {{"
        );
        out.push_str("\tswitch (src) {\n");
        for (index, value) in values.iter().enumerate() {
            let _ = writeln!(
                out,
                "\tcase {prefix}{upper}_{value}: writer.write<int>({index}); return;"
            );
        }
        out.push_str("\t}\n}\n\n");
    }
}

fn emit_struct_serializers(out: &mut String, registry: &TypeRegistry, namespace: &str) {
    let prefix = cpp_namespace_prefix(namespace);

    for (name, fields) in registry.structs() {
        let _ = writeln!(
            out,
            "template <> inline void read(MessageReader& reader, {prefix}{name}& dst) {{"
        );
        for field in fields {
            let _ = writeln!(out, "\tread(reader, dst.{});", field.name);
        }
        out.push_str("}\n\n");

        let _ = writeln!(
            out,
            "template <> inline void write(MessageWriter& writer, const {prefix}{name}& src) {{"
        );
        for field in fields {
            let _ = writeln!(out, "\twrite(writer, src.{});", field.name);
        }
        out.push_str("}\n\n");
    }
}

fn emit_message_specializations(out: &mut String, registry: &TypeRegistry, namespace: &str) {
    let prefix = cpp_namespace_prefix(namespace);

    for name in registry.messages() {
        let hash = registry.hash_of(name);

        let _ = writeln!(
            out,
            "template <> inline string get_type_identifier<{prefix}{name}>() {{ return string(\"{hash}\"); }}\n"
        );

        let _ = writeln!(
            out,
            "template<> inline shared_ptr<Message> routio::Message::pack<{prefix}{name}>(const {prefix}{name} &data) {{"
        );
        out.push_str("\tMessageWriter writer;\n");
        out.push_str("\twrite(writer, data);\n");
        out.push_str("\treturn make_shared<BufferedMessage>(writer);\n");
        out.push_str("}\n\n");

        let _ = writeln!(
            out,
            "template<> inline shared_ptr<{prefix}{name}> routio::Message::unpack<{prefix}{name}>(SharedMessage message) {{"
        );
        out.push_str("\tMessageReader reader(message);\n");
        let _ = writeln!(out, "\tshared_ptr<{prefix}{name}> result(new {prefix}{name}());");
        out.push_str("\tread(reader, *result);\n");
        out.push_str("\treturn result;\n");
        out.push_str("}\n\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::parser::parse;
    use crate::message::digest;

    const SAMPLE: &str =
        "namespace x; enumerate C { R, G, B }  message M { int32 a; float[] b; }";

    #[test]
    fn test_emission_is_deterministic() {
        let a = emit_cpp(&parse(SAMPLE, "<a>").unwrap(), "sample.cpp");
        let b = emit_cpp(&parse(SAMPLE, "<b>").unwrap(), "sample.cpp");
        assert_eq!(a, b);
    }

    #[test]
    fn test_guard_and_namespace() {
        let code = emit_cpp(&parse(SAMPLE, "<t>").unwrap(), "sample.cpp");
        assert!(code.starts_with("// This is an autogenerated file"));
        assert!(code.contains("#ifndef __SAMPLE_MSGS_H"));
        assert!(code.contains("namespace x {"));
        assert!(code.ends_with("#endif\n"));
    }

    #[test]
    fn test_enum_emission() {
        let code = emit_cpp(&parse(SAMPLE, "<t>").unwrap(), "");
        assert!(code.contains("enum C { C_R, C_G, C_B };"));
        assert!(code.contains("case 0: dst = ::x::C_R; break;"));
        assert!(code.contains("case ::x::C_B: writer.write<int>(2); return;"));
    }

    #[test]
    fn test_struct_emission() {
        let code = emit_cpp(&parse(SAMPLE, "<t>").unwrap(), "");
        assert!(code.contains("class M {"));
        assert!(code.contains("int32_t a = 0"));
        assert!(code.contains("std::vector<float> b = {}"));
        assert!(code.contains("this->a = a;"));
        assert!(code.contains("read(reader, dst.a);"));
        assert!(code.contains("write(writer, src.b);"));
    }

    #[test]
    fn test_message_binding_uses_registry_hash() {
        let desc = parse(SAMPLE, "<t>").unwrap();
        let registry = TypeRegistry::from_description(&desc);
        let code = emit_cpp(&desc, "");

        let hash = registry.hash_of("M");
        assert!(code.contains(&format!(
            "get_type_identifier<::x::M>() {{ return string(\"{hash}\"); }}"
        )));
        assert!(code.contains("Message::pack<::x::M>"));
        assert!(code.contains("Message::unpack<::x::M>"));
        // Builtins fold their bare name; user types must not collide.
        assert_ne!(hash, digest("M"));
    }

    #[test]
    fn test_fixed_array_uses_std_array() {
        let code = emit_cpp(
            &parse("structure S { float32[9] rotation; }", "<t>").unwrap(),
            "",
        );
        assert!(code.contains("std::array<float, 9> rotation"));
        assert!(code.contains("#include <array>"));
    }

    #[test]
    fn test_external_reader_writer() {
        let text = r#"external Image (
            language cpp "cv::Mat" from "opencv2/core.hpp" read "readMat" write "writeMat";
        );"#;
        let code = emit_cpp(&parse(text, "<t>").unwrap(), "");
        assert!(code.contains("#include <opencv2/core.hpp>"));
        assert!(code.contains("dst = readMat(reader);"));
        assert!(code.contains("writeMat(writer, src);"));
    }

    #[test]
    fn test_no_namespace_means_no_prefix() {
        let code = emit_cpp(&parse("message M { int32 a; }", "<t>").unwrap(), "");
        assert!(code.contains("get_type_identifier<M>()"));
        assert!(!code.contains("::::"));
    }

    #[test]
    fn test_properties_emit_nothing() {
        let with = emit_cpp(
            &parse("structure S { int32 a (min=0); }", "<t>").unwrap(),
            "",
        );
        let without = emit_cpp(&parse("structure S { int32 a; }", "<t>").unwrap(), "");
        assert_eq!(with, without);
    }
}
