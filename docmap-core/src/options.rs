//! Encode, decode and struct-codec configuration.
//!
//! All option structs deserialize with every field optional, so they can be
//! loaded from a configuration file in any serde format.

use serde::Deserialize;

use crate::registry::Registry;
use crate::tags::TagConvention;

/// Options for one encode call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    /// Write 64-bit integers as 32-bit when the value fits.
    pub min_size: bool,
    /// Fail on descriptor key duplication and on inline map keys that
    /// collide with struct fields, instead of resolving them silently.
    pub error_on_inline_duplicates: bool,
    /// Render map keys whose type is not a string or integer with `to_string`.
    pub stringify_map_keys: bool,
    /// Write a `None` map as an empty document instead of null.
    pub nil_map_as_empty: bool,
    /// Write a `None` sequence as an empty array instead of null.
    pub nil_slice_as_empty: bool,
    /// Write a `None` byte string as empty binary instead of null.
    pub nil_bytes_as_empty: bool,
    /// Treat a struct as empty when all of its fields are empty.
    pub omit_zero_struct: bool,
    pub use_json_struct_tags: bool,
    /// Omit every empty field of the struct being encoded. Not forwarded to
    /// nested values.
    pub omit_empty: bool,
}

impl EncodeOptions {
    pub fn convention(&self) -> TagConvention {
        if self.use_json_struct_tags {
            TagConvention::Json
        } else {
            TagConvention::Native
        }
    }

    /// Options handed to a field's encoder.
    pub fn forwarded(&self, field_min_size: bool) -> Self {
        EncodeOptions {
            min_size: self.min_size || field_min_size,
            omit_empty: false,
            ..self.clone()
        }
    }
}

/// Options for one decode call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DecodeOptions {
    /// Allow lossy numeric conversions (fractional doubles into integers).
    pub truncate: bool,
    /// Reset a struct to zero before decoding into it.
    pub zero_structs: bool,
    /// Clear a map before decoding into it.
    pub zero_maps: bool,
    pub use_json_struct_tags: bool,
}

impl DecodeOptions {
    pub fn convention(&self) -> TagConvention {
        if self.use_json_struct_tags {
            TagConvention::Json
        } else {
            TagConvention::Native
        }
    }

    pub fn forwarded(&self, field_truncate: bool) -> Self {
        DecodeOptions {
            truncate: self.truncate || field_truncate,
            ..self.clone()
        }
    }
}

/// Behavior of the struct codec itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StructCodecOptions {
    /// Reset the destination struct before decoding, as `zero_structs` does.
    pub decode_zero_struct: bool,
    /// Before decoding a struct with inlined fields, zero it and pre-allocate
    /// every nested `Option` of a struct.
    pub decode_deep_zero_inline: bool,
    /// Treat structs whose fields are all empty as empty for `omitempty`.
    pub encode_omit_default_struct: bool,
    /// Include non-`pub` fields that are marked embedded.
    pub allow_unexported_fields: bool,
    /// Let a shallower field win over deeper inlined fields of the same name.
    /// When false every duplicated name is an error.
    pub overwrite_duplicated_inlined_fields: bool,
}

impl Default for StructCodecOptions {
    fn default() -> Self {
        StructCodecOptions {
            decode_zero_struct: false,
            decode_deep_zero_inline: false,
            encode_omit_default_struct: false,
            allow_unexported_fields: false,
            overwrite_duplicated_inlined_fields: true,
        }
    }
}

/// Registry and options in effect while encoding one value.
#[derive(Clone, Copy)]
pub struct EncodeContext<'r> {
    pub registry: &'r Registry,
    pub options: &'r EncodeOptions,
}

impl<'r> EncodeContext<'r> {
    pub fn new(registry: &'r Registry, options: &'r EncodeOptions) -> Self {
        EncodeContext { registry, options }
    }
}

/// Registry and options in effect while decoding one value.
#[derive(Clone, Copy)]
pub struct DecodeContext<'r> {
    pub registry: &'r Registry,
    pub options: &'r DecodeOptions,
}

impl<'r> DecodeContext<'r> {
    pub fn new(registry: &'r Registry, options: &'r DecodeOptions) -> Self {
        DecodeContext { registry, options }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forwarding_drops_omit_empty() {
        let options = EncodeOptions {
            omit_empty: true,
            stringify_map_keys: true,
            ..EncodeOptions::default()
        };
        let child = options.forwarded(true);
        assert!(!child.omit_empty);
        assert!(child.min_size);
        assert!(child.stringify_map_keys);
    }

    #[test]
    fn truncate_is_ored() {
        let options = DecodeOptions::default();
        assert!(options.forwarded(true).truncate);
        assert!(!options.forwarded(false).truncate);
        let strict = DecodeOptions {
            truncate: true,
            ..DecodeOptions::default()
        };
        assert!(strict.forwarded(false).truncate);
    }

    #[test]
    fn struct_codec_defaults_overwrite_duplicates() {
        let parsed: StructCodecOptions = serde_json::from_str("{}").unwrap();
        assert!(parsed.overwrite_duplicated_inlined_fields);
        assert_eq!(parsed, StructCodecOptions::default());
    }

    #[test]
    fn options_load_from_json() {
        let encode: EncodeOptions =
            serde_json::from_str(r#"{"min_size": true, "use_json_struct_tags": true}"#).unwrap();
        assert!(encode.min_size);
        assert_eq!(encode.convention(), TagConvention::Json);

        let decode: DecodeOptions = serde_json::from_str(r#"{"zero_maps": true}"#).unwrap();
        assert!(decode.zero_maps && !decode.truncate);
    }
}
