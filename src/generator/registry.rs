//! Type registry for the code emitters.
//!
//! Holds the builtin type table (container and default expressions per
//! target language) and everything a description declares, with the type
//! identifier digest computed for each entry. Emission iterates sorted
//! names so output is deterministic; struct and message fields keep their
//! declaration order, which is also the order the digest folds them in.

use std::collections::BTreeMap;

use crate::message::{digest, type_digest};

use super::ast::{Decl, Description, External, Field};

/// Everything an emitter needs to know about one type.
#[derive(Debug, Clone, Default)]
pub struct TypeMetadata {
    /// Type name as written in descriptions.
    pub name: String,
    /// Type identifier digest.
    pub hash: String,
    /// Builtin rather than declared.
    pub is_builtin: bool,
    /// Declared via `external`.
    pub is_external: bool,
    /// Container type per language.
    pub containers: BTreeMap<String, String>,
    /// Default-value expression per language.
    pub defaults: BTreeMap<String, String>,
    /// Reader function per language (externals only).
    pub readers: BTreeMap<String, String>,
    /// Writer function per language (externals only).
    pub writers: BTreeMap<String, String>,
    /// Includes/imports per language.
    pub sources: BTreeMap<String, Vec<String>>,
}

impl TypeMetadata {
    /// Container type in `language`, falling back to the raw name.
    pub fn container(&self, language: &str) -> &str {
        self.containers.get(language).map(String::as_str).unwrap_or(&self.name)
    }

    /// Default expression in `language`, if known.
    pub fn default_value(&self, language: &str) -> Option<&str> {
        self.defaults.get(language).map(String::as_str)
    }
}

/// Registry of builtin and declared types for one description.
pub struct TypeRegistry {
    types: BTreeMap<String, TypeMetadata>,
    enums: BTreeMap<String, Vec<String>>,
    structs: BTreeMap<String, Vec<Field>>,
    messages: Vec<String>,
}

impl TypeRegistry {
    /// Registry seeded with the builtin table only.
    pub fn new() -> Self {
        let mut registry = Self {
            types: BTreeMap::new(),
            enums: BTreeMap::new(),
            structs: BTreeMap::new(),
            messages: Vec::new(),
        };
        registry.register_builtins();
        registry
    }

    /// Registry with everything `description` declares folded in.
    pub fn from_description(description: &Description) -> Self {
        let mut registry = Self::new();
        for decl in &description.decls {
            match decl {
                Decl::Enumerate(e) => registry.register_enum(&e.name, &e.values),
                Decl::Structure(s) => registry.register_struct(&s.name, &s.fields),
                Decl::Message(m) => registry.register_message(&m.name, &m.fields),
                Decl::External(e) => registry.register_external(e),
                // Pass-through declarations contribute no types.
                Decl::Include(_) | Decl::Import(_) => {}
            }
        }
        registry
    }

    fn builtin(
        &mut self,
        name: &str,
        cpp: &str,
        python: &str,
        cpp_default: Option<&str>,
        python_default: Option<&str>,
    ) {
        let mut meta = TypeMetadata {
            name: name.to_string(),
            hash: digest(name),
            is_builtin: true,
            ..TypeMetadata::default()
        };
        meta.containers.insert("cpp".into(), cpp.to_string());
        meta.containers.insert("python".into(), python.to_string());
        if let Some(value) = cpp_default {
            meta.defaults.insert("cpp".into(), value.to_string());
        }
        if let Some(value) = python_default {
            meta.defaults.insert("python".into(), value.to_string());
        }

        match name {
            "string" => {
                meta.sources.insert("cpp".into(), vec!["string".into()]);
            }
            "timestamp" => {
                meta.sources.insert("cpp".into(), vec!["chrono".into()]);
                meta.sources.insert("python".into(), vec!["datetime".into()]);
            }
            "array" | "tensor" => {
                meta.sources
                    .insert("cpp".into(), vec!["vector".into(), "routio/array.h".into()]);
                meta.sources.insert("python".into(), vec!["numpy".into()]);
            }
            "header" => {
                meta.sources.insert("cpp".into(), vec!["routio/datatypes.h".into()]);
            }
            _ => {}
        }

        self.types.insert(name.to_string(), meta);
    }

    fn register_builtins(&mut self) {
        self.builtin("int8", "int8_t", "int", Some("0"), Some("0"));
        self.builtin("int16", "int16_t", "int", Some("0"), Some("0"));
        self.builtin("int32", "int32_t", "int", Some("0"), Some("0"));
        self.builtin("int64", "int64_t", "routio.long", Some("0"), Some("0"));
        self.builtin("uint8", "uint8_t", "int", Some("0"), Some("0"));
        self.builtin("uint16", "uint16_t", "int", Some("0"), Some("0"));
        self.builtin("uint32", "uint32_t", "int", Some("0"), Some("0"));
        self.builtin("uint64", "uint64_t", "int", Some("0"), Some("0"));
        self.builtin("float32", "float", "float", Some("0.0f"), Some("0.0"));
        self.builtin("float64", "double", "routio.double", Some("0.0"), Some("0.0"));
        self.builtin("bool", "bool", "bool", Some("false"), Some("False"));
        self.builtin("string", "std::string", "str", Some("\"\""), Some("\"\""));

        // Convenience aliases.
        self.builtin("int", "int32_t", "int", Some("0"), Some("0"));
        self.builtin("float", "float", "float", Some("0.0f"), Some("0.0"));
        self.builtin("double", "double", "routio.double", Some("0.0"), Some("0.0"));
        self.builtin("char", "char", "routio.char", Some("'\\0'"), Some("'\\0'"));

        self.builtin(
            "timestamp",
            "std::chrono::system_clock::time_point",
            "datetime.datetime",
            None,
            None,
        );
        self.builtin(
            "header",
            "routio::Header",
            "routio.Header",
            Some("routio::Header()"),
            Some("routio.Header()"),
        );
        self.builtin(
            "array",
            "routio::Array",
            "numpy.ndarray",
            Some("routio::Array()"),
            Some("numpy.zeros((0,))"),
        );
        self.builtin(
            "tensor",
            "routio::Tensor",
            "numpy.ndarray",
            Some("routio::Tensor()"),
            Some("numpy.zeros((0,))"),
        );
    }

    /// Register an enum; its digest folds the name, then each variant in
    /// declaration order.
    pub fn register_enum(&mut self, name: &str, values: &[String]) {
        let mut hash = digest(name);
        for value in values {
            hash = digest(&format!("{hash}{value}"));
        }

        self.enums.insert(name.to_string(), values.to_vec());
        self.types.insert(
            name.to_string(),
            TypeMetadata {
                name: name.to_string(),
                hash,
                ..TypeMetadata::default()
            },
        );
    }

    /// Register a structure; its digest folds the name and the ordered
    /// (type, name) field list.
    pub fn register_struct(&mut self, name: &str, fields: &[Field]) {
        let digest_fields: Vec<(String, String)> = fields
            .iter()
            .map(|f| (f.type_name.clone(), f.name.clone()))
            .collect();

        self.structs.insert(name.to_string(), fields.to_vec());
        self.types.insert(
            name.to_string(),
            TypeMetadata {
                name: name.to_string(),
                hash: type_digest(name, &digest_fields),
                ..TypeMetadata::default()
            },
        );
    }

    /// Register a message: a structure plus a pub/sub binding.
    pub fn register_message(&mut self, name: &str, fields: &[Field]) {
        self.messages.push(name.to_string());
        self.register_struct(name, fields);
    }

    /// Register an external type from its declaration.
    pub fn register_external(&mut self, external: &External) {
        let mut meta = TypeMetadata {
            name: external.name.clone(),
            hash: digest(&external.name),
            is_external: true,
            ..TypeMetadata::default()
        };

        for lang in &external.languages {
            let key = match lang.language.as_str() {
                "c++" => "cpp".to_string(),
                "py" => "python".to_string(),
                other => other.to_string(),
            };
            meta.containers.insert(key.clone(), lang.container.clone());
            if let Some(value) = &lang.default_value {
                meta.defaults.insert(key.clone(), value.clone());
            }
            if let Some(read) = &lang.read {
                meta.readers.insert(key.clone(), read.clone());
            }
            if let Some(write) = &lang.write {
                meta.writers.insert(key.clone(), write.clone());
            }
            meta.sources.entry(key).or_default().extend(lang.sources.iter().cloned());
        }

        self.types.insert(external.name.clone(), meta);
    }

    /// Look a type up by name.
    pub fn get(&self, name: &str) -> Option<&TypeMetadata> {
        self.types.get(name)
    }

    /// Type identifier for `name`; unknown names fold their bare name.
    pub fn hash_of(&self, name: &str) -> String {
        self.types
            .get(name)
            .map(|meta| meta.hash.clone())
            .unwrap_or_else(|| digest(name))
    }

    /// All registered types, sorted by name.
    pub fn types(&self) -> impl Iterator<Item = &TypeMetadata> {
        self.types.values()
    }

    /// Declared enums, sorted by name, variants in declaration order.
    pub fn enums(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.enums.iter()
    }

    /// Declared structures and messages, sorted by name, fields in
    /// declaration order.
    pub fn structs(&self) -> impl Iterator<Item = (&String, &Vec<Field>)> {
        self.structs.iter()
    }

    /// Declared messages in declaration order.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    /// Includes/imports needed by the used types, sorted and deduplicated.
    pub fn sources(&self, language: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .types
            .values()
            .filter_map(|meta| meta.sources.get(language))
            .flatten()
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::parser::parse;

    #[test]
    fn test_builtins_present() {
        let registry = TypeRegistry::new();
        for name in ["int8", "int32", "uint64", "float32", "bool", "string", "tensor"] {
            let meta = registry.get(name).unwrap();
            assert!(meta.is_builtin);
            assert_eq!(meta.hash, digest(name));
        }
    }

    #[test]
    fn test_builtin_containers() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.get("int32").unwrap().container("cpp"), "int32_t");
        assert_eq!(registry.get("int32").unwrap().container("python"), "int");
        assert_eq!(registry.get("string").unwrap().container("cpp"), "std::string");
    }

    #[test]
    fn test_struct_hash_uses_declaration_order() {
        let a = parse("structure S { int32 a; float32 b; }", "<t>").unwrap();
        let b = parse("structure S { float32 b; int32 a; }", "<t>").unwrap();

        let ra = TypeRegistry::from_description(&a);
        let rb = TypeRegistry::from_description(&b);
        assert_ne!(ra.hash_of("S"), rb.hash_of("S"));
    }

    #[test]
    fn test_identical_descriptions_hash_equal() {
        let text = "namespace x; enumerate C { R, G, B } message M { int32 a; float[] b; }";
        let ra = TypeRegistry::from_description(&parse(text, "<a>").unwrap());
        let rb = TypeRegistry::from_description(&parse(text, "<b>").unwrap());

        assert_eq!(ra.hash_of("M"), rb.hash_of("M"));
        assert_eq!(ra.hash_of("C"), rb.hash_of("C"));
    }

    #[test]
    fn test_message_registered_as_struct_too() {
        let desc = parse("message M { int32 a; }", "<t>").unwrap();
        let registry = TypeRegistry::from_description(&desc);

        assert_eq!(registry.messages(), ["M"]);
        assert!(registry.structs().any(|(name, _)| name == "M"));
    }

    #[test]
    fn test_external_language_aliases() {
        let desc = parse(
            "external E ( language c++ \"Mat\"; language py \"ndarray\"; );",
            "<t>",
        )
        .unwrap();
        let registry = TypeRegistry::from_description(&desc);

        let meta = registry.get("E").unwrap();
        assert!(meta.is_external);
        assert_eq!(meta.container("cpp"), "Mat");
        assert_eq!(meta.container("python"), "ndarray");
    }

    #[test]
    fn test_sources_sorted_and_deduped() {
        let registry = TypeRegistry::new();
        let sources = registry.sources("cpp");
        let mut sorted = sources.clone();
        sorted.sort();
        assert_eq!(sources, sorted);
        assert!(sources.contains(&"chrono".to_string()));
        assert!(sources.iter().filter(|s| *s == "vector").count() == 1);
    }

    #[test]
    fn test_unknown_type_hash_falls_back_to_name() {
        let registry = TypeRegistry::new();
        assert_eq!(registry.hash_of("Mystery"), digest("Mystery"));
    }
}
