use serde::Deserialize;

use crate::error::TagError;
use crate::shape::FieldShape;

/// Which field annotations name a struct's document fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagConvention {
    /// `#[docmap(tag = "...")]` only.
    #[default]
    Native,
    /// `#[docmap(tag = "...")]`, falling back to `#[docmap(json = "...")]`.
    Json,
}

/// Interpreted options for one struct field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldTags {
    pub name: String,
    pub omit_empty: bool,
    pub min_size: bool,
    pub truncate: bool,
    pub inline: bool,
    pub skip: bool,
}

/// Interprets a field's annotation under `convention`.
///
/// The annotation is `name[,option...]`. A bare `-` skips the field; an empty
/// name falls back to the lowercased field identifier.
pub fn parse_field_tags(
    field: &FieldShape,
    convention: TagConvention,
) -> Result<FieldTags, TagError> {
    let (raw, strict) = match convention {
        TagConvention::Native => (field.tag("docmap"), true),
        TagConvention::Json => match field.tag("docmap") {
            Some(tag) => (Some(tag), true),
            None => (field.tag("json"), false),
        },
    };
    let raw = raw.unwrap_or("");

    if raw == "-" {
        return Ok(FieldTags {
            name: field.name.to_lowercase(),
            skip: true,
            ..FieldTags::default()
        });
    }

    let mut parts = raw.split(',');
    let name = parts.next().unwrap_or("");
    let mut tags = FieldTags {
        name: if name.is_empty() {
            field.name.to_lowercase()
        } else {
            name.to_string()
        },
        ..FieldTags::default()
    };

    for option in parts {
        match option {
            "omitempty" => tags.omit_empty = true,
            "minsize" => tags.min_size = true,
            "truncate" => tags.truncate = true,
            "inline" => tags.inline = true,
            "" => {}
            other if strict => {
                return Err(TagError::UnknownOption {
                    field: field.name.to_string(),
                    option: other.to_string(),
                });
            }
            // alternate annotations carry options of their own format
            _ => {}
        }
    }
    Ok(tags)
}
