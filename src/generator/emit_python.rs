//! Python code emitter.
//!
//! Produces one module per description: enum helpers, external type
//! registrations, classes with default-initialized fields and ordered
//! constructors, read/write staticmethods registered with the runtime,
//! and per-message `<Name>Subscriber`/`<Name>Publisher` classes bound to
//! the computed type identifier.

use std::fmt::Write;

use super::ast::{Description, Field, Value};
use super::registry::TypeRegistry;

/// Generate Python for a parsed description.
pub fn emit_python(description: &Description) -> String {
    let registry = TypeRegistry::from_description(description);

    let mut out = String::new();
    out.push_str(
        "# This is an autogenerated file, do not modify!\n\
         from __future__ import absolute_import\n\
         from __future__ import division\n\
         from __future__ import print_function\n\
         from __future__ import unicode_literals\n\n\
         import routio\n",
    );

    let sources = registry.sources("python");
    for source in &sources {
        let _ = writeln!(out, "import {source}");
    }
    out.push('\n');

    emit_enum_helper(&mut out);
    emit_enums(&mut out, &registry);
    emit_externals(&mut out, &registry);
    emit_structs(&mut out, &registry);
    emit_messages(&mut out, &registry);

    out
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
        Value::Bool(b) => if *b { "True" } else { "False" }.to_string(),
    }
}

fn python_type(registry: &TypeRegistry, field: &Field) -> String {
    registry
        .get(&field.type_name)
        .map(|meta| meta.container("python").to_string())
        .unwrap_or_else(|| field.type_name.clone())
}

fn field_default(registry: &TypeRegistry, field: &Field) -> String {
    if let Some(value) = &field.default {
        return format_value(value);
    }
    if field.array.is_some() {
        return "None".to_string();
    }
    registry
        .get(&field.type_name)
        .and_then(|meta| meta.default_value("python"))
        .unwrap_or("None")
        .to_string()
}

fn emit_enum_helper(out: &mut String) {
    out.push_str(
        "def enum(name, enums):\n\
         \x20   reverse = dict((value, key) for key, value in enums.items())\n\
         \x20   enums[\"str\"] = staticmethod(lambda x: reverse[x])\n\
         \x20   return type(name, (), enums)\n\n\
         def enum_conversion(enum, obj):\n\
         \x20   if isinstance(obj, int):\n\
         \x20       return obj\n\
         \x20   if isinstance(obj, str):\n\
         \x20       return getattr(enum, obj)\n\
         \x20   return 0\n\n",
    );
}

fn emit_enums(out: &mut String, registry: &TypeRegistry) {
    for (name, values) in registry.enums() {
        let body = values
            .iter()
            .enumerate()
            .map(|(index, value)| format!("'{value}' : {index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let _ = writeln!(out, "{name} = enum(\"{name}\", {{ {body} }})\n");
        let _ = writeln!(
            out,
            "routio.registerType({name}, lambda x: x.readInt(), lambda x, o: x.writeInt(o), lambda x: enum_conversion({name}, x))\n"
        );
    }
}

fn emit_externals(out: &mut String, registry: &TypeRegistry) {
    let mut wrote = false;
    for meta in registry.types() {
        let (Some(reader), Some(writer)) =
            (meta.readers.get("python"), meta.writers.get("python"))
        else {
            continue;
        };
        let _ = writeln!(
            out,
            "routio.registerType({}, {reader}, {writer})",
            meta.container("python")
        );
        wrote = true;
    }
    if wrote {
        out.push('\n');
    }
}

fn emit_structs(out: &mut String, registry: &TypeRegistry) {
    for (name, fields) in registry.structs() {
        let _ = writeln!(out, "class {name}(object):");
        out.push_str("    def __init__(self");
        for field in fields {
            let _ = write!(out, ",\n        {} = {}", field.name, field_default(registry, field));
        }
        out.push_str("):\n");

        for field in fields {
            if field.array.is_some() {
                let _ = writeln!(out, "        if {} is None:", field.name);
                let _ = writeln!(out, "            self.{} = []", field.name);
                out.push_str("        else:\n");
                let _ = writeln!(out, "            self.{0} = {0}", field.name);
            } else if field.default.is_none() && field_default(registry, field) == "None" {
                let _ = writeln!(out, "        if {} is None:", field.name);
                let _ = writeln!(
                    out,
                    "            self.{} = {}()",
                    field.name,
                    python_type(registry, field)
                );
                out.push_str("        else:\n");
                let _ = writeln!(out, "            self.{0} = {0}", field.name);
            } else {
                let _ = writeln!(out, "        self.{0} = {0}", field.name);
            }
        }
        out.push_str("        pass\n\n");

        // Reader
        out.push_str("    @staticmethod\n    def read(reader):\n");
        let _ = writeln!(out, "        dst = {name}()");
        for field in fields {
            let call = if field.array.is_some() { "readList" } else { "readType" };
            let _ = writeln!(
                out,
                "        dst.{} = routio.{call}({}, reader)",
                field.name,
                python_type(registry, field)
            );
        }
        out.push_str("        return dst\n\n");

        // Writer
        out.push_str("    @staticmethod\n    def write(writer, obj):\n");
        for field in fields {
            let call = if field.array.is_some() { "writeList" } else { "writeType" };
            let _ = writeln!(
                out,
                "        routio.{call}({}, writer, obj.{})",
                python_type(registry, field),
                field.name
            );
        }
        out.push_str("        pass\n\n");

        let _ = writeln!(out, "routio.registerType({name}, {name}.read, {name}.write)\n");
    }
}

fn emit_messages(out: &mut String, registry: &TypeRegistry) {
    for name in registry.messages() {
        let hash = registry.hash_of(name);

        let _ = writeln!(out, "class {name}Subscriber(routio.Subscriber):\n");
        out.push_str("    def __init__(self, client, alias, callback):\n");
        out.push_str("        def _read(message):\n");
        out.push_str("            reader = routio.MessageReader(message)\n");
        let _ = writeln!(out, "            return {name}.read(reader)\n");
        let _ = writeln!(
            out,
            "        super({name}Subscriber, self).__init__(client, alias, \"{hash}\", lambda x: callback(_read(x)))\n\n"
        );

        let _ = writeln!(out, "class {name}Publisher(routio.Publisher):\n");
        out.push_str("    def __init__(self, client, alias):\n");
        let _ = writeln!(
            out,
            "        super({name}Publisher, self).__init__(client, alias, \"{hash}\")\n"
        );
        out.push_str("    def send(self, obj):\n");
        out.push_str("        writer = routio.MessageWriter()\n");
        let _ = writeln!(out, "        {name}.write(writer, obj)");
        let _ = writeln!(out, "        super({name}Publisher, self).send(writer)\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::parser::parse;

    const SAMPLE: &str =
        "namespace x; enumerate C { R, G, B }  message M { int32 a; float[] b; }";

    #[test]
    fn test_emission_is_deterministic() {
        let a = emit_python(&parse(SAMPLE, "<a>").unwrap());
        let b = emit_python(&parse(SAMPLE, "<b>").unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_header_and_imports() {
        let code = emit_python(&parse(SAMPLE, "<t>").unwrap());
        assert!(code.starts_with("# This is an autogenerated file"));
        assert!(code.contains("import routio"));
    }

    #[test]
    fn test_enum_emission() {
        let code = emit_python(&parse(SAMPLE, "<t>").unwrap());
        assert!(code.contains("C = enum(\"C\", { 'R' : 0, 'G' : 1, 'B' : 2 })"));
        assert!(code.contains("routio.registerType(C, lambda x: x.readInt()"));
    }

    #[test]
    fn test_struct_emission() {
        let code = emit_python(&parse(SAMPLE, "<t>").unwrap());
        assert!(code.contains("class M(object):"));
        assert!(code.contains("a = 0"));
        assert!(code.contains("dst.a = routio.readType(int, reader)"));
        assert!(code.contains("routio.writeList(float, writer, obj.b)"));
        assert!(code.contains("routio.registerType(M, M.read, M.write)"));
    }

    #[test]
    fn test_message_pubsub_bound_to_hash() {
        let desc = parse(SAMPLE, "<t>").unwrap();
        let registry = TypeRegistry::from_description(&desc);
        let code = emit_python(&desc);

        let hash = registry.hash_of("M");
        assert!(code.contains("class MSubscriber(routio.Subscriber):"));
        assert!(code.contains("class MPublisher(routio.Publisher):"));
        assert!(code.contains(&format!("\"{hash}\"")));
    }

    #[test]
    fn test_cross_language_hash_agreement() {
        use crate::generator::emit_cpp::emit_cpp;

        let desc = parse(SAMPLE, "<t>").unwrap();
        let registry = TypeRegistry::from_description(&desc);
        let hash = registry.hash_of("M");

        assert!(emit_python(&desc).contains(&hash));
        assert!(emit_cpp(&desc, "").contains(&hash));
    }

    #[test]
    fn test_default_string_field() {
        let code = emit_python(&parse("structure S { string name = \"x\"; }", "<t>").unwrap());
        assert!(code.contains("name = \"x\""));
    }
}
