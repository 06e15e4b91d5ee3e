//! Process-wide FType registry for foreign value representations.
//!
//! Value types defined in this crate implement [`FTyped`] directly; types
//! defined elsewhere register a computation rule here, once, during setup.
//! The table is written only at initialization and read thereafter, so a
//! single global behind an `RwLock` is sufficient (no concurrent writers
//! are expected).

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;

use crate::buffer::NdBuffer;
use crate::error::Error;
use crate::ftype::{FType, FTyped};

type Rule = Box<dyn Fn(&dyn Any) -> FType + Send + Sync>;

static REGISTRY: Lazy<RwLock<HashMap<TypeId, Rule>>> = Lazy::new(|| {
    let mut rules: HashMap<TypeId, Rule> = HashMap::new();
    // The built-in buffer type is registered up front, mirroring how its
    // FTyped impl computes the descriptor.
    rules.insert(
        TypeId::of::<NdBuffer>(),
        Box::new(|value| {
            value
                .downcast_ref::<NdBuffer>()
                .expect("registry rules are keyed by TypeId")
                .ftype()
        }),
    );
    RwLock::new(rules)
});

/// Teach the registry about a new value representation.
///
/// Call once per type at startup; later registrations for the same type
/// replace the earlier rule.
pub fn register<T: Any>(rule: fn(&T) -> FType) {
    log::debug!("registering ftype rule for {}", std::any::type_name::<T>());
    REGISTRY
        .write()
        .expect("ftype registry lock poisoned")
        .insert(
            TypeId::of::<T>(),
            Box::new(move |value| {
                rule(value
                    .downcast_ref::<T>()
                    .expect("registry rules are keyed by TypeId"))
            }),
        );
}

/// Compute the FType of an arbitrary value by registry dispatch on its
/// runtime representation.
pub fn ftype_of<T: Any>(value: &T) -> Result<FType, Error> {
    let registry = REGISTRY.read().expect("ftype registry lock poisoned");
    match registry.get(&TypeId::of::<T>()) {
        Some(rule) => Ok(rule(value)),
        None => Err(Error::UnknownFType(std::any::type_name::<T>().to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ftype::ElemType;

    /// A foreign array type: a square diagonal matrix stored as its diagonal.
    struct Diagonal {
        entries: Vec<f64>,
    }

    fn diagonal_ftype(_d: &Diagonal) -> FType {
        FType::tensor(ElemType::F64, 2)
    }

    #[test]
    fn test_builtin_buffer_rule_is_preregistered() {
        let buf = NdBuffer::from_f64(vec![1.0, 2.0], vec![2]).unwrap();
        assert_eq!(ftype_of(&buf).unwrap(), FType::tensor(ElemType::F64, 1));
    }

    #[test]
    fn test_register_then_lookup() {
        register::<Diagonal>(diagonal_ftype);
        let d = Diagonal {
            entries: vec![1.0, 2.0, 3.0],
        };
        assert_eq!(d.entries.len(), 3);
        assert_eq!(ftype_of(&d).unwrap(), FType::tensor(ElemType::F64, 2));
    }

    #[test]
    fn test_unregistered_type_reports_not_implemented() {
        struct Opaque;
        let err = ftype_of(&Opaque).unwrap_err();
        assert!(matches!(err, Error::UnknownFType(_)));
    }
}
