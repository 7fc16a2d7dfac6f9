//! Reader for downloaded variant files.
//!
//! Supports VCF (read with `noodles-vcf`) and Beacon-friendly JSON (an
//! array of variant documents), each either plain or gzip/bgzip compressed.
//! Compression is detected from the file content, not from the declared kind.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use noodles_vcf as vcf;
use serde_json::Value;
use vcf::variant::record_buf::info::field::value::Array as InfoArray;
use vcf::variant::record_buf::info::field::Value as InfoValue;
use vcf::variant::RecordBuf;

use crate::models::{FileKind, VariantRecord};
use crate::AppError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One alternate allele of a variant entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allele {
    pub bases: String,
    /// Allele count across samples. Zero when the file does not say.
    pub call_count: i64,
    pub variant_type: String,
}

/// One variant line or document, with all its alternate alleles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantEntry {
    pub reference_name: String,
    /// 0-based start.
    pub start: i64,
    pub end: i64,
    pub reference_bases: String,
    pub alternates: Vec<Allele>,
}

/// Parsed content of one variant file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantFile {
    pub entries: Vec<VariantEntry>,
    /// Number of sample columns, when the format carries them.
    pub sample_count: Option<i64>,
}

impl VariantFile {
    /// Expands entries into one record per alternate allele.
    pub fn records(&self, dataset_id: &str, assembly: &str) -> Vec<VariantRecord> {
        self.entries
            .iter()
            .flat_map(|entry| {
                entry.alternates.iter().map(move |allele| VariantRecord {
                    dataset_id: dataset_id.to_string(),
                    assembly_id: assembly.to_string(),
                    reference_name: entry.reference_name.clone(),
                    start: entry.start,
                    end: entry.end,
                    reference_bases: entry.reference_bases.clone(),
                    alternate_bases: allele.bases.clone(),
                    variant_type: allele.variant_type.clone(),
                    call_count: allele.call_count,
                    internal_id: VariantRecord::internal_id_for(
                        assembly,
                        &entry.reference_name,
                        entry.start,
                        &entry.reference_bases,
                        &allele.bases,
                    ),
                })
            })
            .collect()
    }

    pub fn allele_count(&self) -> usize {
        self.entries.iter().map(|e| e.alternates.len()).sum()
    }
}

/// Reads and parses a downloaded variant file.
///
/// Every failure, including a missing or unreadable file, is reported as
/// [`AppError::DataFormat`] so that a bad download only skips its dataset.
pub fn read_variant_file(path: &Path, kind: FileKind) -> Result<VariantFile, AppError> {
    let label = path.display().to_string();
    let reader = open(path).map_err(|e| data_format(&label, e))?;

    if kind.is_vcf() {
        parse_vcf(reader, &label)
    } else {
        let value: Value =
            serde_json::from_reader(reader).map_err(|e| data_format(&label, e))?;
        parse_bff(&value, &label)
    }
}

fn data_format(path: &str, reason: impl ToString) -> AppError {
    AppError::DataFormat {
        path: path.to_string(),
        reason: reason.to_string(),
    }
}

fn open(path: &Path) -> std::io::Result<Box<dyn BufRead>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    let file = File::open(path)?;

    if read == 2 && magic == GZIP_MAGIC {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Parses VCF text. Positions become 0-based; `.` alternates are skipped.
pub fn parse_vcf<R: BufRead>(reader: R, label: &str) -> Result<VariantFile, AppError> {
    let mut reader = vcf::io::Reader::new(reader);
    let header = reader
        .read_header()
        .map_err(|e| data_format(label, format!("header: {}", e)))?;

    let mut parsed = VariantFile {
        entries: Vec::new(),
        sample_count: Some(header.sample_names().len() as i64),
    };

    for (number, result) in reader.record_bufs(&header).enumerate() {
        let entry = result
            .map_err(|e| e.to_string())
            .and_then(|record| vcf_entry(&record))
            .map_err(|reason| data_format(label, format!("record {}: {}", number + 1, reason)))?;
        parsed.entries.push(entry);
    }

    Ok(parsed)
}

fn vcf_entry(record: &RecordBuf) -> Result<VariantEntry, String> {
    let position = record
        .variant_start()
        .ok_or_else(|| "missing position".to_string())?;
    let start = position.get() as i64 - 1;
    let reference_bases = record.reference_bases().to_string();

    let info = record.info();
    let field = |key: &str| info.get(key).flatten();
    let end = field("END")
        .and_then(|v| integers(v).into_iter().next().flatten())
        .unwrap_or(start + reference_bases.len() as i64);
    let allele_counts = field("AC").map(integers).unwrap_or_default();
    let sv_type = field("SVTYPE").and_then(|v| match v {
        InfoValue::String(s) => Some(s.clone()),
        _ => None,
    });

    let alternates = record
        .alternate_bases()
        .as_ref()
        .iter()
        .enumerate()
        .filter(|(_, alt)| alt.as_str() != "." && !alt.is_empty())
        .map(|(i, alt)| Allele {
            bases: alt.clone(),
            call_count: allele_counts.get(i).copied().flatten().unwrap_or(0),
            variant_type: sv_type
                .clone()
                .unwrap_or_else(|| classify(&reference_bases, alt)),
        })
        .collect();

    Ok(VariantEntry {
        reference_name: record.reference_sequence_name().to_string(),
        start,
        end,
        reference_bases,
        alternates,
    })
}

/// Integer values of an INFO field. Text is split on commas, so keys the
/// header declares as strings still count.
fn integers(value: &InfoValue) -> Vec<Option<i64>> {
    match value {
        InfoValue::Integer(n) => vec![Some(i64::from(*n))],
        InfoValue::Array(InfoArray::Integer(values)) => {
            values.iter().map(|v| v.map(i64::from)).collect()
        }
        InfoValue::String(text) => text.split(',').map(|v| v.trim().parse().ok()).collect(),
        InfoValue::Array(InfoArray::String(values)) => values
            .iter()
            .map(|v| v.as_deref().and_then(|v| v.trim().parse().ok()))
            .collect(),
        _ => Vec::new(),
    }
}

/// Derives the variant type of an allele from its bases.
///
/// # Examples
///
/// ```
/// use beacon_core::variants::classify;
///
/// assert_eq!(classify("A", "G"), "SNP");
/// assert_eq!(classify("A", "AT"), "INS");
/// assert_eq!(classify("A", "<DUP>"), "DUP");
/// ```
pub fn classify(reference: &str, alternate: &str) -> String {
    if let Some(symbolic) = alternate
        .strip_prefix('<')
        .and_then(|a| a.strip_suffix('>'))
    {
        return symbolic.split(':').next().unwrap_or(symbolic).to_string();
    }
    let kind = match reference.len().cmp(&alternate.len()) {
        std::cmp::Ordering::Equal if reference.len() == 1 => "SNP",
        std::cmp::Ordering::Equal => "MNP",
        std::cmp::Ordering::Less => "INS",
        std::cmp::Ordering::Greater => "DEL",
    };
    kind.to_string()
}

/// Parses a Beacon-friendly JSON array.
///
/// Each document may use the flat legacy layout (`referenceName`, `start`,
/// ...) or the nested `variation` layout.
pub fn parse_bff(value: &Value, label: &str) -> Result<VariantFile, AppError> {
    let docs = value
        .as_array()
        .ok_or_else(|| data_format(label, "expected a JSON array of variants"))?;

    let entries = docs
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            parse_bff_doc(doc).map_err(|reason| data_format(label, format!("entry {}: {}", i, reason)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(VariantFile {
        entries,
        sample_count: None,
    })
}

fn lookup<'a>(doc: &'a Value, flat: &str, nested: &str) -> Option<&'a Value> {
    doc.get(flat).or_else(|| doc.pointer(nested))
}

fn parse_bff_doc(doc: &Value) -> Result<VariantEntry, String> {
    let text = |flat: &str, nested: &str| -> Result<String, String> {
        lookup(doc, flat, nested)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| format!("missing {}", flat))
    };

    let reference_name = text("referenceName", "/variation/location/sequence_id")?;
    let reference_bases = text("referenceBases", "/variation/referenceBases")?;
    let alternate_bases = text("alternateBases", "/variation/alternateBases")?;
    let start = lookup(doc, "start", "/variation/location/interval/start/value")
        .and_then(position)
        .ok_or("missing start")?;
    let end = lookup(doc, "end", "/variation/location/interval/end/value")
        .and_then(position)
        .unwrap_or(start + reference_bases.len() as i64);
    let declared_type = lookup(doc, "variantType", "/variation/variantType").and_then(Value::as_str);
    let call_count = doc.get("callCount").and_then(Value::as_i64).unwrap_or(0);

    let alternates = alternate_bases
        .split(',')
        .filter(|alt| !alt.is_empty() && *alt != ".")
        .map(|alt| Allele {
            bases: alt.to_string(),
            call_count,
            variant_type: declared_type
                .map(str::to_string)
                .unwrap_or_else(|| classify(&reference_bases, alt)),
        })
        .collect();

    Ok(VariantEntry {
        reference_name,
        start,
        end,
        reference_bases,
        alternates,
    })
}

/// Accepts a number or a one-element array holding a number.
fn position(value: &Value) -> Option<i64> {
    match value {
        Value::Array(items) => items.first().and_then(Value::as_i64),
        other => other.as_i64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use serde_json::json;
    use std::io::Write;

    const VCF: &str = "##fileformat=VCFv4.2\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n\
        1\t101\t.\tA\tG,T\t50\tPASS\tAC=3,1;AN=4\tGT\t0/1\t1/2\n\
        1\t200\trs1\tAT\tA\t50\tPASS\tDP=10\tGT\t0/0\t0/0\n\
        2\t300\t.\tC\t.\t50\tPASS\t.\tGT\t0/0\t0/0\n\
        X\t400\t.\tN\t<DEL>\t50\tPASS\tSVTYPE=DEL;END=1400\tGT\t0/1\t0/0\n";

    #[test]
    fn test_parse_vcf() {
        let parsed = parse_vcf(VCF.as_bytes(), "mem").unwrap();

        assert_eq!(parsed.sample_count, Some(2));
        assert_eq!(parsed.entries.len(), 4);

        let first = &parsed.entries[0];
        assert_eq!(first.start, 100);
        assert_eq!(first.end, 101);
        assert_eq!(first.alternates.len(), 2);
        assert_eq!(first.alternates[0].call_count, 3);
        assert_eq!(first.alternates[1].call_count, 1);
        assert_eq!(first.alternates[1].variant_type, "SNP");

        let deletion = &parsed.entries[1];
        assert_eq!(deletion.alternates[0].variant_type, "DEL");
        assert_eq!(deletion.alternates[0].call_count, 0);

        assert!(parsed.entries[2].alternates.is_empty());

        let sv = &parsed.entries[3];
        assert_eq!(sv.end, 1400);
        assert_eq!(sv.alternates[0].variant_type, "DEL");
    }

    #[test]
    fn test_records_split_alternates() {
        let parsed = parse_vcf(VCF.as_bytes(), "mem").unwrap();
        let records = parsed.records("galaxy-grch38", "GRCh38");

        assert_eq!(records.len(), parsed.allele_count());
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].internal_id, "GRCh38:1:100A>G");
        assert_eq!(records[1].alternate_bases, "T");
        assert!(records.iter().all(|r| r.dataset_id == "galaxy-grch38"));
    }

    #[test]
    fn test_malformed_vcf_record() {
        let text = "##fileformat=VCFv4.2\n\
            #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
            1\t5\t.\tA\tG\t.\t.\t.\n\
            1\tabc\t.\tA\tG\t.\t.\t.\n";
        let err = parse_vcf(text.as_bytes(), "bad.vcf").unwrap_err();

        assert!(matches!(err, AppError::DataFormat { .. }));
        assert!(err.to_string().contains("record 2"));
    }

    #[test]
    fn test_vcf_without_header_is_rejected() {
        let text = "1\t101\t.\tA\tG\t.\t.\t.\n";
        let err = parse_vcf(text.as_bytes(), "headless.vcf").unwrap_err();
        assert!(err.to_string().contains("header"));
    }

    #[test]
    fn test_vcf_without_samples() {
        let text = "##fileformat=VCFv4.3\n\
            ##INFO=<ID=AC,Number=A,Type=Integer,Description=\"Allele count\">\n\
            #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
            2\t500\t.\tG\tA,C\t.\t.\tAC=2,.\n";
        let parsed = parse_vcf(text.as_bytes(), "mem").unwrap();

        assert_eq!(parsed.sample_count, Some(0));
        let counts: Vec<i64> = parsed.entries[0].alternates.iter().map(|a| a.call_count).collect();
        assert_eq!(counts, vec![2, 0]);
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("A", "C"), "SNP");
        assert_eq!(classify("AC", "GT"), "MNP");
        assert_eq!(classify("A", "ACGT"), "INS");
        assert_eq!(classify("ACGT", "A"), "DEL");
        assert_eq!(classify("N", "<INV>"), "INV");
        assert_eq!(classify("N", "<DUP:TANDEM>"), "DUP");
    }

    #[test]
    fn test_parse_bff_flat_and_nested() {
        let docs = json!([
            {
                "assemblyId": "GRCh38",
                "referenceName": "17",
                "start": 43044294,
                "referenceBases": "A",
                "alternateBases": "T",
                "variantType": "SNP",
                "callCount": 2
            },
            {
                "variation": {
                    "location": {
                        "sequence_id": "NC_000017.11",
                        "interval": { "start": { "value": 5 }, "end": { "value": 8 } }
                    },
                    "referenceBases": "ACG",
                    "alternateBases": "A"
                }
            }
        ]);

        let parsed = parse_bff(&docs, "mem").unwrap();
        assert_eq!(parsed.sample_count, None);
        assert_eq!(parsed.entries[0].start, 43044294);
        assert_eq!(parsed.entries[0].end, 43044295);
        assert_eq!(parsed.entries[0].alternates[0].call_count, 2);

        let nested = &parsed.entries[1];
        assert_eq!(nested.reference_name, "NC_000017.11");
        assert_eq!(nested.end, 8);
        assert_eq!(nested.alternates[0].variant_type, "DEL");
    }

    #[test]
    fn test_parse_bff_requires_coordinates() {
        let err = parse_bff(&json!([{ "referenceName": "1" }]), "x.json").unwrap_err();
        assert!(err.to_string().contains("entry 0"));

        assert!(parse_bff(&json!({ "not": "an array" }), "x.json").is_err());
    }

    #[test]
    fn test_read_gzipped_vcf() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut encoder = GzEncoder::new(file.reopen().unwrap(), Compression::default());
        encoder.write_all(VCF.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let parsed = read_variant_file(file.path(), FileKind::VcfBgzip).unwrap();
        assert_eq!(parsed.entries.len(), 4);
    }

    #[test]
    fn test_read_plain_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"referenceName":"1","start":[9],"referenceBases":"A","alternateBases":"G,C"}}]"#
        )
        .unwrap();

        let parsed = read_variant_file(file.path(), FileKind::Json).unwrap();
        assert_eq!(parsed.entries[0].start, 9);
        assert_eq!(parsed.allele_count(), 2);
    }

    #[test]
    fn test_missing_file_is_data_format() {
        let err = read_variant_file(Path::new("/nonexistent/dataset-x"), FileKind::Vcf).unwrap_err();
        assert!(matches!(err, AppError::DataFormat { .. }));
        assert!(!err.aborts_rebuild());
    }
}
