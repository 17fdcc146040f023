use crate::codec::{CodecError, TypeTag, Value};
use crate::decode::decode_default;
use crate::identity::SerialFormat;
use cip_transport::AttributePath;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// CIP Parameter Object.
pub const PARAMETER_CLASS: u16 = 0x0F;
/// DPI Parameter Object used by PowerFlex 7-class hosts.
pub const DPI_PARAMETER_CLASS: u16 = 0x93;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("catalog {family}: ordinal 0 is not allowed")]
    ZeroOrdinal { family: String },
    #[error("catalog {family}: duplicate ordinal {ordinal}")]
    DuplicateOrdinal { family: String, ordinal: u32 },
    #[error("family key ({device_type}, {product_code}) already registered by {existing}")]
    DuplicateFamily {
        device_type: u16,
        product_code: u16,
        existing: String,
    },
}

/// One catalog document as stored on disk (YAML).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct CatalogDocument {
    pub family: String,
    pub device_type: u16,
    pub product_code: u16,
    #[serde(default)]
    #[cfg_attr(feature = "schema", schemars(with = "String"))]
    pub variant: BehaviorVariant,
    #[serde(default)]
    pub serial_format: SerialFormat,
    #[serde(default)]
    pub parameters: Vec<ParameterDescriptor>,
}

/// Catalog entry for one parameter ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub struct ParameterDescriptor {
    pub ordinal: u32,
    pub name: String,
    /// Type tag literal, resolved through [`TypeTag::parse`].
    #[serde(rename = "type")]
    pub type_tag: String,
    /// Raw little-endian attribute bytes as hex.
    #[serde(default)]
    pub default: String,
    #[serde(default = "default_recordable")]
    pub recordable: bool,
}

fn default_recordable() -> bool {
    true
}

impl ParameterDescriptor {
    /// Placeholder keeping ordinal alignment across catalog gaps.
    pub fn reserved(ordinal: u32) -> Self {
        Self {
            ordinal,
            name: "Reserved".to_string(),
            type_tag: "U2".to_string(),
            default: "0000".to_string(),
            recordable: false,
        }
    }

    pub fn tag(&self) -> Result<TypeTag, CodecError> {
        TypeTag::parse(&self.type_tag)
    }

    pub fn default_value(&self) -> Result<Value, CodecError> {
        decode_default(self.tag()?, &self.default)
    }
}

/// Enumeration protocol selected per family. Written in catalogs as its
/// label: `standard`, `dpi` or `e3-relay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BehaviorVariant {
    #[default]
    StandardCompliant,
    FamilySpecific(FamilyVariant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FamilyVariant {
    /// DPI host parameters: class 0x93, online value in attribute 9.
    Dpi,
    /// E3/E300 relays publish the parameter count as "Number of Instances".
    E3Relay,
}

/// Which class/instance/attribute IDs carry which role for a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeLayout {
    pub parameter_class: u16,
    pub value_attribute: u16,
    pub max_ordinal: AttributePath,
    pub max_ordinal_tag: TypeTag,
}

impl AttributeLayout {
    /// Parameter ordinal N lives at instance N.
    pub fn value_path(&self, ordinal: u32) -> AttributePath {
        AttributePath::new(self.parameter_class, ordinal, self.value_attribute)
    }
}

impl BehaviorVariant {
    pub fn layout(&self) -> AttributeLayout {
        match self {
            BehaviorVariant::StandardCompliant => AttributeLayout {
                parameter_class: PARAMETER_CLASS,
                value_attribute: 1,
                // class attribute 2: Max Instance
                max_ordinal: AttributePath::class_attribute(PARAMETER_CLASS, 2),
                max_ordinal_tag: TypeTag::UInt2,
            },
            BehaviorVariant::FamilySpecific(FamilyVariant::Dpi) => AttributeLayout {
                parameter_class: DPI_PARAMETER_CLASS,
                value_attribute: 9,
                max_ordinal: AttributePath::class_attribute(DPI_PARAMETER_CLASS, 2),
                max_ordinal_tag: TypeTag::UInt2,
            },
            BehaviorVariant::FamilySpecific(FamilyVariant::E3Relay) => AttributeLayout {
                parameter_class: PARAMETER_CLASS,
                value_attribute: 1,
                // class attribute 3: Number of Instances
                max_ordinal: AttributePath::class_attribute(PARAMETER_CLASS, 3),
                max_ordinal_tag: TypeTag::UInt2,
            },
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BehaviorVariant::StandardCompliant => "standard",
            BehaviorVariant::FamilySpecific(FamilyVariant::Dpi) => "dpi",
            BehaviorVariant::FamilySpecific(FamilyVariant::E3Relay) => "e3-relay",
        }
    }
}

impl TryFrom<String> for BehaviorVariant {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.trim() {
            "standard" => Ok(BehaviorVariant::StandardCompliant),
            "dpi" => Ok(BehaviorVariant::FamilySpecific(FamilyVariant::Dpi)),
            "e3-relay" => Ok(BehaviorVariant::FamilySpecific(FamilyVariant::E3Relay)),
            other => Err(format!(
                "unknown variant {other:?} (expected standard, dpi or e3-relay)"
            )),
        }
    }
}

impl From<BehaviorVariant> for String {
    fn from(v: BehaviorVariant) -> Self {
        v.label().to_string()
    }
}

/// Ordered, gap-free parameter table for one family. Immutable after build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    family: String,
    // index = ordinal - 1
    parameters: Vec<ParameterDescriptor>,
}

impl Catalog {
    /// Sort by ordinal and fill gaps with reserved placeholders.
    pub fn build(
        family: impl Into<String>,
        mut parameters: Vec<ParameterDescriptor>,
    ) -> Result<Self, CatalogError> {
        let family = family.into();
        parameters.sort_by_key(|p| p.ordinal);
        let mut dense: Vec<ParameterDescriptor> = Vec::with_capacity(parameters.len());
        for p in parameters {
            if p.ordinal == 0 {
                return Err(CatalogError::ZeroOrdinal { family });
            }
            let next = dense.len() as u32 + 1;
            if p.ordinal < next {
                return Err(CatalogError::DuplicateOrdinal {
                    family,
                    ordinal: p.ordinal,
                });
            }
            for gap in next..p.ordinal {
                dense.push(ParameterDescriptor::reserved(gap));
            }
            dense.push(p);
        }
        Ok(Self {
            family,
            parameters: dense,
        })
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn get(&self, ordinal: u32) -> Option<&ParameterDescriptor> {
        let idx = usize::try_from(ordinal).ok()?.checked_sub(1)?;
        self.parameters.get(idx)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parameters.iter()
    }

    pub fn recordable(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.parameters.iter().filter(|p| p.recordable)
    }

    /// Entries whose tag or default cannot be decoded. Reserved placeholders
    /// and non-recordable entries are only checked for their tag.
    pub fn issues(&self) -> Vec<(u32, CodecError)> {
        let mut out = Vec::new();
        for p in &self.parameters {
            let checked = if p.recordable {
                p.default_value().map(|_| ())
            } else {
                p.tag().map(|_| ())
            };
            if let Err(e) = checked {
                out.push((p.ordinal, e));
            }
        }
        out
    }
}

/// Registry entry: which catalog and enumeration protocol a model uses.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceFamilyDescriptor {
    pub name: String,
    pub device_type: u16,
    pub product_code: u16,
    pub catalog: Arc<Catalog>,
    pub variant: BehaviorVariant,
    pub serial_format: SerialFormat,
}

impl DeviceFamilyDescriptor {
    pub fn from_document(doc: CatalogDocument) -> Result<Self, CatalogError> {
        let catalog = Catalog::build(doc.family.clone(), doc.parameters)?;
        Ok(Self {
            name: doc.family,
            device_type: doc.device_type,
            product_code: doc.product_code,
            catalog: Arc::new(catalog),
            variant: doc.variant,
            serial_format: doc.serial_format,
        })
    }

    pub fn key(&self) -> (u16, u16) {
        (self.device_type, self.product_code)
    }

    /// File-name friendly form of the family name.
    pub fn slug(&self) -> String {
        slugify(&self.name)
    }
}

pub(crate) fn slugify(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    out.trim_end_matches('-').to_string()
}
