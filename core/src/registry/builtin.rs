//! Built-in type providers.
//!
//! | Provider          | Types                                   |
//! |-------------------|-----------------------------------------|
//! | `core-types`      | `metadata.base`, every `attr` value kind |
//! | `object-types`    | `object.pojo`, `proxy`, `map`, `value`  |
//! | `field-types`     | `field.string` and the other primitives |
//! | `validator-types` | `validator.required`, `length`, ...     |
//! | `key-types`       | `key.primary`, `secondary`, `foreign`   |
//! | `view-types`      | `view.text`, `textarea`, ...            |

use std::sync::Arc;

use crate::error::Result;
use crate::registry::TypeRegistry;
use crate::registry::provider::TypeProvider;
use crate::registry::types::{
    Binding, NodeKind, TypeDeclaration, TypeExtension, WILDCARD, type_names,
};
use crate::value::ValueKind;

/// Provider ids of the built-in catalog. Every other built-in depends on `core-types`.
pub const CORE_TYPES: &str = "core-types";
pub const OBJECT_TYPES: &str = "object-types";
pub const FIELD_TYPES: &str = "field-types";
pub const VALIDATOR_TYPES: &str = "validator-types";
pub const KEY_TYPES: &str = "key-types";
pub const VIEW_TYPES: &str = "view-types";

const FIELD_SUBTYPES: &[&str] = &[
    "string",
    "int",
    "long",
    "short",
    "byte",
    "double",
    "float",
    "decimal",
    "boolean",
    "date",
    "time",
    "timestamp",
    "class",
    "object",
    "objectArray",
    "stringArray",
];

/// Returns every built-in provider, in dependency order.
pub fn builtin_providers() -> Vec<Arc<dyn TypeProvider>> {
    vec![
        Arc::new(CoreTypes),
        Arc::new(ObjectTypes),
        Arc::new(FieldTypes),
        Arc::new(ValidatorTypes),
        Arc::new(KeyTypes),
        Arc::new(ViewTypes),
    ]
}

/// Value kind of a field's own values (`defaultValue`, `minValue`, ...).
pub fn field_value_kind(subtype: &str) -> ValueKind {
    match subtype {
        "int" | "short" | "byte" => ValueKind::INT,
        "long" => ValueKind::LONG,
        "double" | "float" | "decimal" => ValueKind::DOUBLE,
        "boolean" => ValueKind::BOOLEAN,
        "stringArray" => ValueKind::STRING_ARRAY,
        _ => ValueKind::STRING,
    }
}

fn declaration(type_name: &str, subtype: &str) -> TypeDeclaration {
    TypeDeclaration::new(
        type_name,
        subtype,
        Binding::new(
            NodeKind::for_type(type_name, subtype),
            format!("{type_name}.{subtype}"),
        ),
    )
}

fn core_dependency() -> Vec<String> {
    vec![CORE_TYPES.to_string()]
}

/// Attributes every node type understands.
fn common_attributes(type_name: &str) -> TypeExtension {
    TypeExtension::for_type(type_name)
        .with_attribute("isAbstract", ValueKind::BOOLEAN)
        .with_attribute("description", ValueKind::STRING)
        .accepts(type_names::ATTR, WILDCARD, WILDCARD)
}

/// The document root and the attribute value kinds.
pub struct CoreTypes;

impl TypeProvider for CoreTypes {
    fn provider_id(&self) -> &str {
        CORE_TYPES
    }

    fn description(&self) -> &str {
        "document root and attribute value kinds"
    }

    fn register_types(&self, registry: &TypeRegistry) -> Result<()> {
        let mut root = declaration(type_names::METADATA, "base")
            .with_description("Root of a metadata tree")
            .as_default();
        for child in [
            type_names::OBJECT,
            type_names::FIELD,
            type_names::ATTR,
            type_names::VALIDATOR,
            type_names::VIEW,
            type_names::KEY,
        ] {
            root = root.accepts(child, WILDCARD, WILDCARD);
        }
        registry.register(root)?;

        for kind in ValueKind::ALL {
            let mut attr = declaration(type_names::ATTR, kind.subtype());
            if kind == ValueKind::STRING {
                attr = attr.as_default();
            }
            registry.register(attr)?;
        }
        Ok(())
    }
}

/// Object subtypes: `pojo` (the default), `proxy`, `map` and `value`.
pub struct ObjectTypes;

impl TypeProvider for ObjectTypes {
    fn provider_id(&self) -> &str {
        OBJECT_TYPES
    }

    fn dependencies(&self) -> Vec<String> {
        core_dependency()
    }

    fn register_types(&self, registry: &TypeRegistry) -> Result<()> {
        for subtype in ["pojo", "proxy", "map", "value"] {
            let mut object = declaration(type_names::OBJECT, subtype)
                .accepts(type_names::FIELD, WILDCARD, WILDCARD)
                .accepts(type_names::OBJECT, WILDCARD, WILDCARD)
                .accepts(type_names::VALIDATOR, WILDCARD, WILDCARD)
                .accepts(type_names::KEY, WILDCARD, WILDCARD)
                .accepts(type_names::VIEW, WILDCARD, WILDCARD)
                .with_attribute("objectRef", ValueKind::STRING);
            if subtype == "pojo" {
                object = object.as_default();
            }
            registry.register(object)?;
        }
        registry.extend(common_attributes(type_names::OBJECT))
    }
}

/// Field subtypes, `string` by default. Value attributes such as `maxValue`
/// take the kind of the field's own values.
pub struct FieldTypes;

impl TypeProvider for FieldTypes {
    fn provider_id(&self) -> &str {
        FIELD_TYPES
    }

    fn dependencies(&self) -> Vec<String> {
        core_dependency()
    }

    fn register_types(&self, registry: &TypeRegistry) -> Result<()> {
        for subtype in FIELD_SUBTYPES {
            let own = field_value_kind(subtype);
            let mut field = declaration(type_names::FIELD, subtype)
                .with_attribute("defaultValue", own)
                .with_attribute("maxValue", own)
                .with_attribute("minValue", own)
                .accepts(type_names::VALIDATOR, WILDCARD, WILDCARD)
                .accepts(type_names::VIEW, WILDCARD, WILDCARD);
            if *subtype == "string" {
                field = field.as_default();
            }
            registry.register(field)?;
        }
        registry.extend(
            common_attributes(type_names::FIELD)
                .with_attribute("required", ValueKind::BOOLEAN)
                .with_attribute("isOptional", ValueKind::BOOLEAN)
                .with_attribute("isReadOnly", ValueKind::BOOLEAN)
                .with_attribute("maxLength", ValueKind::INT)
                .with_attribute("minLength", ValueKind::INT)
                .with_attribute("precision", ValueKind::INT)
                .with_attribute("scale", ValueKind::INT)
                .with_attribute("pattern", ValueKind::STRING)
                .with_attribute("objectRef", ValueKind::STRING)
                .with_attribute("format", ValueKind::STRING),
        )
    }
}

/// Validator subtypes. Unnamed validators get numbered names, `required1`
/// and so on.
pub struct ValidatorTypes;

impl TypeProvider for ValidatorTypes {
    fn provider_id(&self) -> &str {
        VALIDATOR_TYPES
    }

    fn dependencies(&self) -> Vec<String> {
        core_dependency()
    }

    fn register_types(&self, registry: &TypeRegistry) -> Result<()> {
        registry.register(
            declaration(type_names::VALIDATOR, "required")
                .with_name_prefix("required")
                .as_default(),
        )?;
        registry.register(
            declaration(type_names::VALIDATOR, "length")
                .with_name_prefix("length")
                .with_attribute("min", ValueKind::INT)
                .with_attribute("max", ValueKind::INT),
        )?;
        registry.register(
            declaration(type_names::VALIDATOR, "regex")
                .with_name_prefix("regex")
                .with_attribute("mask", ValueKind::STRING),
        )?;
        registry.register(
            declaration(type_names::VALIDATOR, "numeric")
                .with_name_prefix("numeric")
                .with_attribute("min", ValueKind::DOUBLE)
                .with_attribute("max", ValueKind::DOUBLE),
        )?;
        registry.register(
            declaration(type_names::VALIDATOR, "array")
                .with_name_prefix("array")
                .with_attribute("minSize", ValueKind::INT)
                .with_attribute("maxSize", ValueKind::INT),
        )?;
        registry.extend(
            common_attributes(type_names::VALIDATOR).with_attribute("message", ValueKind::STRING),
        )
    }
}

/// Key subtypes. Every key carries a `keys` string array; an unnamed primary
/// key is named `primary`.
pub struct KeyTypes;

impl TypeProvider for KeyTypes {
    fn provider_id(&self) -> &str {
        KEY_TYPES
    }

    fn dependencies(&self) -> Vec<String> {
        core_dependency()
    }

    fn register_types(&self, registry: &TypeRegistry) -> Result<()> {
        registry.register(
            declaration(type_names::KEY, "primary")
                .with_default_name("primary")
                .as_default(),
        )?;
        registry.register(declaration(type_names::KEY, "secondary").with_name_prefix("secondary"))?;
        registry.register(
            declaration(type_names::KEY, "foreign")
                .with_name_prefix("foreign")
                .with_attribute("foreignObjectRef", ValueKind::STRING),
        )?;
        registry.extend(
            common_attributes(type_names::KEY).with_attribute("keys", ValueKind::STRING_ARRAY),
        )
    }
}

/// View subtypes. View names may contain `-`.
pub struct ViewTypes;

impl TypeProvider for ViewTypes {
    fn provider_id(&self) -> &str {
        VIEW_TYPES
    }

    fn dependencies(&self) -> Vec<String> {
        core_dependency()
    }

    fn register_types(&self, registry: &TypeRegistry) -> Result<()> {
        for subtype in ["text", "textarea", "date", "monetary", "hotlink"] {
            let mut view = declaration(type_names::VIEW, subtype);
            if subtype == "text" {
                view = view.as_default();
            }
            registry.register(view)?;
        }
        registry.extend(
            common_attributes(type_names::VIEW)
                .with_attribute("label", ValueKind::STRING)
                .with_attribute("rows", ValueKind::INT)
                .with_attribute("cols", ValueKind::INT),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_builtins().unwrap()
    }

    #[test]
    fn test_default_subtypes() {
        let registry = registry();
        assert_eq!(registry.default_subtype("metadata").as_deref(), Some("base"));
        assert_eq!(registry.default_subtype("object").as_deref(), Some("pojo"));
        assert_eq!(registry.default_subtype("field").as_deref(), Some("string"));
        assert_eq!(registry.default_subtype("attr").as_deref(), Some("string"));
        assert_eq!(registry.default_subtype("key").as_deref(), Some("primary"));
        assert_eq!(registry.default_subtype("view").as_deref(), Some("text"));
    }

    #[test]
    fn test_field_attribute_overrides() {
        let registry = registry();
        assert_eq!(
            registry.attribute_override("field", "string", "required"),
            Some(ValueKind::BOOLEAN)
        );
        assert_eq!(
            registry.attribute_override("field", "string", "maxLength"),
            Some(ValueKind::INT)
        );
        assert_eq!(
            registry.attribute_override("field", "int", "maxValue"),
            Some(ValueKind::INT)
        );
        assert_eq!(
            registry.attribute_override("field", "double", "maxValue"),
            Some(ValueKind::DOUBLE)
        );
        assert_eq!(
            registry.attribute_override("field", "long", "defaultValue"),
            Some(ValueKind::LONG)
        );
        assert_eq!(registry.attribute_override("field", "string", "priority"), None);
        assert_eq!(
            registry.attribute_override("key", "primary", "keys"),
            Some(ValueKind::STRING_ARRAY)
        );
    }

    #[test]
    fn test_structural_constraints() {
        let registry = registry();
        assert!(registry.accepts_child("metadata", "base", "object", "pojo", "Car"));
        assert!(registry.accepts_child("object", "pojo", "field", "int", "wheels"));
        assert!(registry.accepts_child("field", "int", "attr", "double", "priority"));
        assert!(registry.accepts_child("field", "int", "validator", "required", "required1"));
        assert!(!registry.accepts_child("field", "int", "field", "int", "nested"));
        assert!(!registry.accepts_child("attr", "string", "attr", "string", "nested"));
    }

    #[test]
    fn test_attr_bindings_carry_value_kind() {
        let registry = registry();
        let decl = registry.resolve("attr", Some("intArray")).unwrap();
        assert_eq!(
            decl.binding.kind,
            NodeKind::Attribute(ValueKind::Array(crate::ScalarKind::Int))
        );
    }
}
