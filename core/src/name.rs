//! Qualified names, package expansion and name validation.
//!
//! Packages are `::`-separated. A reference may be relative to a base
//! package: a leading `::` appends to the base, and every leading `..::`
//! drops one trailing segment of the base before appending.

use std::sync::LazyLock;

use regex::Regex;

use crate::error::{MetaDataError, Result};

/// Separator between package segments and between package and short name.
pub const PKG_SEPARATOR: &str = "::";

const PARENT_PREFIX: &str = "..::";

static NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").expect("static regex must compile")
});

static VIEW_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9_-]*$").expect("static regex must compile")
});

/// Joins a package and a short name. An empty package yields the short name.
pub fn qualify(package: &str, name: &str) -> String {
    if package.is_empty() {
        name.to_string()
    } else {
        format!("{package}{PKG_SEPARATOR}{name}")
    }
}

/// Splits a qualified name into `(package, short_name)`.
///
/// ```
/// use metamodel_core::split_qualified;
///
/// assert_eq!(split_qualified("acme::vehicle::Car"), ("acme::vehicle", "Car"));
/// assert_eq!(split_qualified("Car"), ("", "Car"));
/// ```
pub fn split_qualified(name: &str) -> (&str, &str) {
    match name.rfind(PKG_SEPARATOR) {
        Some(idx) => (&name[..idx], &name[idx + PKG_SEPARATOR.len()..]),
        None => ("", name),
    }
}

/// Returns true when the reference is relative to some base package.
pub fn is_relative(reference: &str) -> bool {
    reference.starts_with(PKG_SEPARATOR) || reference.starts_with(PARENT_PREFIX)
}

/// Expands a possibly relative package reference against `base`.
///
/// Absolute references are returned unchanged.
///
/// ```
/// use metamodel_core::expand_package_ref;
///
/// let expanded = expand_package_ref("acme::vehicle", "..::common::id").unwrap();
/// assert_eq!(expanded, "acme::common::id");
///
/// let expanded = expand_package_ref("acme", "::Car").unwrap();
/// assert_eq!(expanded, "acme::Car");
///
/// assert!(expand_package_ref("acme", "..::..::x").is_err());
/// ```
pub fn expand_package_ref(base: &str, reference: &str) -> Result<String> {
    if let Some(rest) = reference.strip_prefix(PKG_SEPARATOR) {
        return Ok(qualify(base, rest));
    }
    if !reference.starts_with(PARENT_PREFIX) {
        return Ok(reference.to_string());
    }

    let mut segments: Vec<&str> = base
        .split(PKG_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect();
    let mut rest = reference;
    let mut climbs = 0;
    while let Some(next) = rest.strip_prefix(PARENT_PREFIX) {
        climbs += 1;
        rest = next;
    }
    if climbs > segments.len() {
        return Err(MetaDataError::InvalidPackagePath {
            base: base.to_string(),
            reference: reference.to_string(),
            climbs,
        });
    }
    segments.truncate(segments.len() - climbs);
    Ok(qualify(&segments.join(PKG_SEPARATOR), rest))
}

/// Checks a short name against the naming rules for `type_name`.
///
/// Views additionally allow `-`.
pub fn validate_name(type_name: &str, name: &str) -> Result<()> {
    let pattern = if type_name == "view" {
        &*VIEW_NAME_PATTERN
    } else {
        &*NAME_PATTERN
    };
    if pattern.is_match(name) {
        Ok(())
    } else {
        Err(MetaDataError::InvalidName {
            type_name: type_name.to_string(),
            name: name.to_string(),
            reason: format!("must match {}", pattern.as_str()),
        })
    }
}

/// Checks every segment of a package against the node name pattern.
///
/// The empty package is valid. Segments never take the view relaxation.
///
/// ```
/// use metamodel_core::validate_package;
///
/// assert!(validate_package("object", "acme::vehicle").is_ok());
/// assert!(validate_package("object", "").is_ok());
/// assert!(validate_package("object", "9bad::has-dash").is_err());
/// ```
pub fn validate_package(type_name: &str, package: &str) -> Result<()> {
    if package.is_empty() {
        return Ok(());
    }
    match package
        .split(PKG_SEPARATOR)
        .find(|segment| !NAME_PATTERN.is_match(segment))
    {
        None => Ok(()),
        Some(segment) => Err(MetaDataError::InvalidName {
            type_name: type_name.to_string(),
            name: package.to_string(),
            reason: format!(
                "package segment '{segment}' must match {}",
                NAME_PATTERN.as_str()
            ),
        }),
    }
}
