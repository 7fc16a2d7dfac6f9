//! Reference assembly normalization.
//!
//! Galaxy stores the reference build of a dataset as a free-form "dbkey"
//! (`GRCh38.p13`, `hg19`, `hg38_patch`, ...). Only the two human genome
//! families are imported, and all patch releases of one build collapse into a
//! single assembly id.

/// Recognized assembly families, matched case-sensitively at the start of the key.
const FAMILIES: [&str; 2] = ["GRCh", "hg"];

/// Returns the family-plus-major-version prefix of `raw`, or `None` if `raw`
/// is not a recognized human assembly.
///
/// # Examples
///
/// ```
/// use beacon_core::assembly::normalize_assembly;
///
/// assert_eq!(normalize_assembly("GRCh38.p13"), Some("GRCh38".to_string()));
/// assert_eq!(normalize_assembly("hg19"), Some("hg19".to_string()));
/// assert_eq!(normalize_assembly("mm10"), None);
/// ```
pub fn normalize_assembly(raw: &str) -> Option<String> {
    FAMILIES.iter().find_map(|family| {
        let rest = raw.strip_prefix(family)?;
        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            return None;
        }
        Some(raw[..family.len() + digits].to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_patch_level() {
        assert_eq!(normalize_assembly("GRCh38.p13").as_deref(), Some("GRCh38"));
        assert_eq!(normalize_assembly("GRCh37.p5").as_deref(), Some("GRCh37"));
        assert_eq!(normalize_assembly("hg38_patch").as_deref(), Some("hg38"));
    }

    #[test]
    fn test_keeps_bare_versions() {
        assert_eq!(normalize_assembly("hg19").as_deref(), Some("hg19"));
        assert_eq!(normalize_assembly("GRCh38").as_deref(), Some("GRCh38"));
    }

    #[test]
    fn test_rejects_unknown_references() {
        for raw in ["?", "", "mm10", "GRCh", "hg", "grch38", "HG19", "dm6", " hg19"] {
            assert_eq!(normalize_assembly(raw), None, "{raw:?} should be rejected");
        }
    }
}
