//! Symbol tables and shared-symbol catalogs.
//!
//! Symbol ids are small integers assigned in import order. Ids 1–9 are the
//! system symbols; everything above comes from catalog imports declared by
//! the document itself.

/// System symbol ids.
pub const SID_ION: u64 = 1;
pub const SID_ION_1_0: u64 = 2;
pub const SID_ION_SYMBOL_TABLE: u64 = 3;
pub const SID_NAME: u64 = 4;
pub const SID_VERSION: u64 = 5;
pub const SID_IMPORTS: u64 = 6;
pub const SID_SYMBOLS: u64 = 7;
pub const SID_MAX_ID: u64 = 8;
pub const SID_ION_SHARED_SYMBOL_TABLE: u64 = 9;

const SYSTEM_MAX: u64 = 10;

/// A named, versioned shared-symbol catalog.
#[derive(Debug, Clone)]
pub struct CatalogItem {
    pub name: String,
    pub version: u32,
    pub symbols: Vec<String>,
}

impl CatalogItem {
    pub fn new(name: impl Into<String>, version: u32, symbols: Vec<String>) -> Self {
        Self {
            name: name.into(),
            version,
            symbols,
        }
    }
}

/// Ordered mapping from symbol id to text.
///
/// Ids are stable once assigned; looking up an unassigned id yields `None`,
/// never an error. Growable only through imports.
pub struct SymbolTable {
    table: Vec<Option<String>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        let mut table = vec![None; SYSTEM_MAX as usize];
        table[SID_ION as usize] = Some("$ion".to_string());
        table[SID_ION_1_0 as usize] = Some("$ion_1_0".to_string());
        table[SID_ION_SYMBOL_TABLE as usize] = Some("$ion_symbol_table".to_string());
        table[SID_NAME as usize] = Some("name".to_string());
        table[SID_VERSION as usize] = Some("version".to_string());
        table[SID_IMPORTS as usize] = Some("imports".to_string());
        table[SID_SYMBOLS as usize] = Some("symbols".to_string());
        table[SID_MAX_ID as usize] = Some("max_id".to_string());
        table[SID_ION_SHARED_SYMBOL_TABLE as usize] = Some("$ion_shared_symbol_table".to_string());
        Self { table }
    }

    /// Resolve a symbol id to its text, if assigned.
    pub fn lookup(&self, sid: u64) -> Option<&str> {
        if sid == 0 {
            return None;
        }
        self.table.get(sid as usize).and_then(|s| s.as_deref())
    }

    /// Append the first `count` names of a catalog.
    pub fn import_catalog(&mut self, item: &CatalogItem, count: usize) {
        for name in item.symbols.iter().take(count) {
            self.table.push(Some(name.clone()));
        }
    }

    /// Append `count` synthesized placeholder names for a catalog whose
    /// contents are not known.
    pub fn import_unknown(&mut self, name: &str, count: usize) {
        for n in 1..=count {
            self.table.push(Some(format!("{name}#{n}")));
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of the DRM schema catalog embedded in protected books.
pub const PROTECTED_DATA: &str = "ProtectedData";

/// Build the `ProtectedData` shared-symbol catalog.
///
/// The tail enumerates every voucher-envelope version observed in the wild;
/// the trailing numeric ranges assume no new non-envelope types are added.
pub fn protected_data_catalog() -> CatalogItem {
    let base = [
        "com.amazon.drm.Envelope@1.0",
        "com.amazon.drm.EnvelopeMetadata@1.0",
        "size",
        "page_size",
        "encryption_key",
        "encryption_transformation",
        "encryption_voucher",
        "signing_key",
        "signing_algorithm",
        "signing_voucher",
        "com.amazon.drm.EncryptedPage@1.0",
        "cipher_text",
        "cipher_iv",
        "com.amazon.drm.Signature@1.0",
        "data",
        "com.amazon.drm.EnvelopeIndexTable@1.0",
        "length",
        "offset",
        "algorithm",
        "encoded",
        "encryption_algorithm",
        "hashing_algorithm",
        "expires",
        "format",
        "id",
        "lock_parameters",
        "strategy",
        "com.amazon.drm.Key@1.0",
        "com.amazon.drm.KeySet@1.0",
        "com.amazon.drm.PIDv3@1.0",
        "com.amazon.drm.PlainTextPage@1.0",
        "com.amazon.drm.PlainText@1.0",
        "com.amazon.drm.PrivateKey@1.0",
        "com.amazon.drm.PublicKey@1.0",
        "com.amazon.drm.SecretKey@1.0",
        "com.amazon.drm.Voucher@1.0",
        "public_key",
        "private_key",
        "com.amazon.drm.KeyPair@1.0",
        "com.amazon.drm.ProtectedData@1.0",
        "doctype",
        "com.amazon.drm.EnvelopeIndexTableOffset@1.0",
        "enddoc",
        "license_type",
        "license",
        "watermark",
        "key",
        "value",
        "com.amazon.drm.License@1.0",
        "category",
        "metadata",
        "categorized_metadata",
        "com.amazon.drm.CategorizedMetadata@1.0",
        "com.amazon.drm.VoucherEnvelope@1.0",
        "mac",
        "voucher",
        "com.amazon.drm.ProtectedData@2.0",
        "com.amazon.drm.Envelope@2.0",
        "com.amazon.drm.EnvelopeMetadata@2.0",
        "com.amazon.drm.EncryptedPage@2.0",
        "com.amazon.drm.PlainText@2.0",
        "compression_algorithm",
        "com.amazon.drm.Compressed@1.0",
        "page_index_table",
    ];

    let mut symbols: Vec<String> = base.iter().map(|s| s.to_string()).collect();
    let envelope_versions = (2..29)
        .chain([
            9708, 1031, 2069, 9041, 3646, 6052, 9479, 9888, 4648, 5683, 7384, 2746, 3332,
        ])
        .chain(10001..11111);
    for n in envelope_versions {
        symbols.push(format!("com.amazon.drm.VoucherEnvelope@{n}.0"));
    }

    CatalogItem::new(PROTECTED_DATA, 1, symbols)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_symbols() {
        let table = SymbolTable::new();
        assert_eq!(table.lookup(SID_ION_1_0), Some("$ion_1_0"));
        assert_eq!(table.lookup(SID_MAX_ID), Some("max_id"));
        assert_eq!(table.lookup(0), None);
        assert_eq!(table.lookup(9999), None);
    }

    #[test]
    fn test_import_appends_in_order() {
        let mut table = SymbolTable::new();
        let item = CatalogItem::new("X", 1, vec!["a".into(), "b".into(), "c".into()]);
        table.import_catalog(&item, 2);
        assert_eq!(table.lookup(10), Some("a"));
        assert_eq!(table.lookup(11), Some("b"));
        assert_eq!(table.lookup(12), None);
    }

    #[test]
    fn test_import_unknown_placeholders() {
        let mut table = SymbolTable::new();
        table.import_unknown("mystery", 2);
        assert_eq!(table.lookup(10), Some("mystery#1"));
        assert_eq!(table.lookup(11), Some("mystery#2"));
    }

    #[test]
    fn test_protected_data_catalog_layout() {
        let item = protected_data_catalog();
        assert_eq!(item.name, PROTECTED_DATA);
        // First entry lands at sid 10 when imported over the system table.
        assert_eq!(item.symbols[0], "com.amazon.drm.Envelope@1.0");
        assert_eq!(item.symbols[53], "com.amazon.drm.VoucherEnvelope@1.0");
        assert_eq!(item.symbols[64], "com.amazon.drm.VoucherEnvelope@2.0");
        assert_eq!(item.symbols.len(), 64 + 27 + 13 + 1110);
    }
}
