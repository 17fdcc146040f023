use crate::registry::FamilyRegistry;
use crate::types::{CatalogDocument, DeviceFamilyDescriptor};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

/// Parse one catalog document. `origin` only labels errors.
pub fn parse_catalog_str(raw: &str, origin: &str) -> anyhow::Result<DeviceFamilyDescriptor> {
    let doc: CatalogDocument =
        serde_yaml::from_str(raw).with_context(|| format!("parsing catalog yaml: {origin}"))?;
    let desc = DeviceFamilyDescriptor::from_document(doc)
        .with_context(|| format!("building catalog: {origin}"))?;
    Ok(desc)
}

pub fn load_catalog_file(path: impl AsRef<Path>) -> anyhow::Result<DeviceFamilyDescriptor> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading catalog: {}", path.display()))?;
    parse_catalog_str(&raw, &path.display().to_string())
}

/// JSON Schema of the catalog document, for editor tooling.
#[cfg(feature = "schema")]
pub fn catalog_schema() -> anyhow::Result<String> {
    let schema = schemars::schema_for!(CatalogDocument);
    serde_json::to_string_pretty(&schema).context("serializing catalog schema")
}

/// Load every `.yml`/`.yaml` catalog in a directory, in file-name order.
pub fn load_catalogs_dir(dir: impl AsRef<Path>) -> anyhow::Result<FamilyRegistry> {
    let mut reg = FamilyRegistry::default();
    let mut entries: Vec<PathBuf> = Vec::new();
    let dir = dir.as_ref();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if let Some(ext) = path.extension() {
            if ext == "yml" || ext == "yaml" {
                entries.push(path);
            }
        }
    }
    entries.sort();
    for p in entries {
        let desc = load_catalog_file(&p)?;
        reg.insert(desc)
            .with_context(|| format!("registering {}", p.display()))?;
    }
    Ok(reg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BehaviorVariant, FamilyVariant};
    use crate::SerialFormat;

    const DOC: &str = r#"
family: Test Drive
device_type: 143
product_code: 77
variant: dpi
serial_format: reversed_hex
parameters:
  - { ordinal: 1, name: "Speed", type: "F4", default: "00000000" }
  - { ordinal: 3, name: "Mode", type: "U1", default: "02", recordable: false }
"#;

    #[test]
    fn test_parse_document() {
        let d = parse_catalog_str(DOC, "inline").unwrap();
        assert_eq!(d.name, "Test Drive");
        assert_eq!(d.key(), (143, 77));
        assert_eq!(d.variant, BehaviorVariant::FamilySpecific(FamilyVariant::Dpi));
        assert_eq!(d.serial_format, SerialFormat::ReversedHex);
        assert_eq!(d.catalog.len(), 3);
        assert_eq!(d.catalog.get(2).unwrap().name, "Reserved");
        assert!(!d.catalog.get(3).unwrap().recordable);
    }

    #[test]
    fn test_defaults_when_omitted() {
        let d = parse_catalog_str(
            "family: Bare\ndevice_type: 1\nproduct_code: 2\n",
            "inline",
        )
        .unwrap();
        assert_eq!(d.variant, BehaviorVariant::StandardCompliant);
        assert_eq!(d.serial_format, SerialFormat::Decimal);
        assert!(d.catalog.is_empty());
    }

    #[test]
    fn test_bad_document_has_context() {
        let err = parse_catalog_str("family: [", "broken.yaml").unwrap_err();
        assert!(format!("{err:#}").contains("broken.yaml"));
        let err = parse_catalog_str(
            "family: X\ndevice_type: 1\nproduct_code: 1\nvariant: modbus\n",
            "v.yaml",
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("unknown variant"));
    }

    #[test]
    fn test_load_dir_sorted_and_filtered() {
        let dir = std::env::temp_dir().join(format!("dbk-catalogs-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("b.yaml"), DOC).unwrap();
        fs::write(
            dir.join("a.yml"),
            "family: Other\ndevice_type: 1\nproduct_code: 1\n",
        )
        .unwrap();
        fs::write(dir.join("notes.txt"), "ignored").unwrap();
        let reg = load_catalogs_dir(&dir).unwrap();
        assert_eq!(reg.len(), 2);
        assert!(reg.lookup(143, 77).is_some());
        fs::write(dir.join("c.yaml"), DOC).unwrap();
        assert!(load_catalogs_dir(&dir).is_err());
        let _ = fs::remove_dir_all(&dir);
    }
}
