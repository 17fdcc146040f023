use crate::loader::parse_catalog_str;
use crate::types::{CatalogError, DeviceFamilyDescriptor};
use std::collections::BTreeMap;

const BUILTIN_CATALOGS: &[(&str, &str)] = &[
    (
        "powerflex-525.yaml",
        include_str!("../catalogs/powerflex-525.yaml"),
    ),
    (
        "powerflex-753.yaml",
        include_str!("../catalogs/powerflex-753.yaml"),
    ),
    ("e300.yaml", include_str!("../catalogs/e300.yaml")),
    ("20-comm-e.yaml", include_str!("../catalogs/20-comm-e.yaml")),
];

/// Exact `(device_type, product_code)` -> family table. No wildcard or
/// range matching; an unmapped pair is always `None`.
#[derive(Debug, Default, Clone)]
pub struct FamilyRegistry {
    families: BTreeMap<(u16, u16), DeviceFamilyDescriptor>,
}

impl FamilyRegistry {
    /// Registry of the catalogs compiled into this crate.
    pub fn builtin() -> anyhow::Result<Self> {
        let mut reg = Self::default();
        for (origin, raw) in BUILTIN_CATALOGS {
            reg.insert(parse_catalog_str(raw, origin)?)?;
        }
        tracing::debug!(families = reg.len(), "built-in catalogs loaded");
        Ok(reg)
    }

    pub fn insert(&mut self, desc: DeviceFamilyDescriptor) -> Result<(), CatalogError> {
        if let Some(existing) = self.families.get(&desc.key()) {
            return Err(CatalogError::DuplicateFamily {
                device_type: desc.device_type,
                product_code: desc.product_code,
                existing: existing.name.clone(),
            });
        }
        self.families.insert(desc.key(), desc);
        Ok(())
    }

    /// Add every family of `other`; fails on the first key collision.
    pub fn merge(&mut self, other: FamilyRegistry) -> Result<usize, CatalogError> {
        let n = other.families.len();
        for (_, desc) in other.families {
            self.insert(desc)?;
        }
        Ok(n)
    }

    pub fn lookup(&self, device_type: u16, product_code: u16) -> Option<&DeviceFamilyDescriptor> {
        self.families.get(&(device_type, product_code))
    }

    pub fn families(&self) -> impl Iterator<Item = &DeviceFamilyDescriptor> {
        self.families.values()
    }

    pub fn len(&self) -> usize {
        self.families.len()
    }

    pub fn is_empty(&self) -> bool {
        self.families.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BehaviorVariant, FamilyVariant};

    #[test]
    fn test_builtin_families() {
        let reg = FamilyRegistry::builtin().unwrap();
        assert_eq!(reg.len(), 4);
        let pf525 = reg.lookup(150, 9).unwrap();
        assert_eq!(pf525.name, "PowerFlex 525");
        assert_eq!(pf525.variant, BehaviorVariant::StandardCompliant);
        let pf753 = reg.lookup(143, 2192).unwrap();
        assert_eq!(pf753.variant, BehaviorVariant::FamilySpecific(FamilyVariant::Dpi));
        let e300 = reg.lookup(3, 651).unwrap();
        assert_eq!(
            e300.variant,
            BehaviorVariant::FamilySpecific(FamilyVariant::E3Relay)
        );
        assert!(reg.lookup(12, 4).is_some());
    }

    #[test]
    fn test_builtin_catalogs_are_clean() {
        let reg = FamilyRegistry::builtin().unwrap();
        for fam in reg.families() {
            assert!(fam.catalog.issues().is_empty(), "{}", fam.name);
            assert!(fam.catalog.recordable().count() > 0, "{}", fam.name);
        }
    }

    #[test]
    fn test_lookup_is_exact_and_pure() {
        let reg = FamilyRegistry::builtin().unwrap();
        let a = reg.lookup(150, 9).cloned();
        let b = reg.lookup(150, 9).cloned();
        assert_eq!(a, b);
        assert!(reg.lookup(999, 999).is_none());
        assert!(reg.lookup(150, 10).is_none());
        assert!(reg.lookup(151, 9).is_none());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut reg = FamilyRegistry::builtin().unwrap();
        let again = FamilyRegistry::builtin().unwrap();
        assert!(matches!(
            reg.merge(again),
            Err(CatalogError::DuplicateFamily { .. })
        ));
    }

    #[test]
    fn test_merge_extra_family() {
        let mut reg = FamilyRegistry::builtin().unwrap();
        let mut extra = FamilyRegistry::default();
        extra
            .insert(
                parse_catalog_str(
                    "family: Custom\ndevice_type: 150\nproduct_code: 10\n",
                    "inline",
                )
                .unwrap(),
            )
            .unwrap();
        assert_eq!(reg.merge(extra).unwrap(), 1);
        assert_eq!(reg.lookup(150, 10).unwrap().name, "Custom");
    }
}
