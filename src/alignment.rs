use crate::cli::TableConfig;
use crate::position::BaseObservation;
use ahash::RandomState;
use std::hash::BuildHasher;

const FLAG_UNMAPPED: u16 = 0x4;
const FLAG_REVERSE: u16 = 0x10;

// Fixed keys so a read name hashes to the same id on every run; mates
// and duplicate records of one template must collide.
const HASH_SEEDS: (u64, u64, u64, u64) = (
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
);

pub fn read_name_id(name: &str) -> u64 {
    let state = RandomState::with_seeds(HASH_SEEDS.0, HASH_SEEDS.1, HASH_SEEDS.2, HASH_SEEDS.3);
    state.hash_one(name.as_bytes())
}

/// One parsed alignment record. `bases` holds one observation per read
/// base; only non-`skip` entries carry conversion evidence.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub mapped: bool,
    pub location: i64,
    pub sequence: String,
    pub bases: Vec<BaseObservation>,
    pub read_name_id: u64,
}

impl Alignment {
    /// Parses one SAM record line. Returns None for lines that are not
    /// SAM records at all; records that cannot contribute evidence
    /// (unmapped, filtered mapping class, missing MD, quality string
    /// mismatch) come back with `mapped = false` and are dropped by the
    /// worker.
    pub fn parse(line: &str, config: &TableConfig) -> Option<Alignment> {
        let mut fields = line.split('\t');
        let qname = fields.next()?;
        let flag = fields.next()?.parse::<u16>().ok()?;
        let rname = fields.next()?;
        let location = fields.next()?.parse::<i64>().ok()?;
        let _mapq = fields.next()?;
        let cigar = fields.next()?;
        let _rnext = fields.next()?;
        let _pnext = fields.next()?;
        let _tlen = fields.next()?;
        let sequence = fields.next()?;
        let qualities = fields.next()?;

        let mut alignment = Alignment {
            mapped: false,
            location,
            sequence: sequence.to_string(),
            bases: Vec::new(),
            read_name_id: read_name_id(qname),
        };

        if flag & FLAG_UNMAPPED != 0 || rname == "*" || sequence == "*" || cigar == "*" {
            return Some(alignment);
        }

        let mut md_tag = None;
        let mut hit_count = None;
        let mut conversion_strand = None;
        for tag in fields {
            if let Some(value) = tag.strip_prefix("MD:Z:") {
                md_tag = Some(value);
            } else if let Some(value) = tag.strip_prefix("NH:i:") {
                hit_count = value.parse::<u32>().ok();
            } else if let Some(value) = tag.strip_prefix("YZ:A:") {
                conversion_strand = value.bytes().next();
            }
        }

        let unique = hit_count.is_none_or(|count| count <= 1);
        if (config.unique_only && !unique) || (config.multiple_only && unique) {
            return Some(alignment);
        }

        let minus_strand = match conversion_strand {
            Some(b'+') => false,
            Some(b'-') => true,
            _ => flag & FLAG_REVERSE != 0,
        };

        let sequence_bytes = sequence.as_bytes();
        let quality_bytes = if qualities == "*" {
            None
        } else {
            let bytes = qualities.as_bytes();
            if bytes.len() != sequence_bytes.len() {
                return Some(alignment);
            }
            Some(bytes)
        };

        let Some(walk) = walk_cigar(cigar, sequence_bytes, quality_bytes) else {
            return None;
        };
        let CigarWalk {
            mut bases,
            aligned_indices,
            aligned_read_bases,
        } = walk;

        let Some(md_tag) = md_tag else {
            return Some(alignment);
        };
        let Some(reference_bases) = reference_bases_from_md(md_tag, &aligned_read_bases) else {
            return Some(alignment);
        };

        if quality_bytes.is_some() {
            let (evidence_ref, evidence_read) = if minus_strand {
                (config.convert_from_complement, config.convert_to_complement)
            } else {
                (config.convert_from, config.convert_to)
            };
            for (walk_index, &base_index) in aligned_indices.iter().enumerate() {
                let reference_base = reference_bases[walk_index].to_ascii_uppercase();
                let read_base = aligned_read_bases[walk_index].to_ascii_uppercase();
                if reference_base != evidence_ref {
                    continue;
                }
                if read_base == evidence_ref {
                    bases[base_index].converted = false;
                    bases[base_index].skip = false;
                } else if read_base == evidence_read {
                    bases[base_index].converted = true;
                    bases[base_index].skip = false;
                }
            }
        }

        alignment.mapped = true;
        alignment.bases = bases;
        Some(alignment)
    }
}

struct CigarWalk {
    bases: Vec<BaseObservation>,
    aligned_indices: Vec<usize>,
    aligned_read_bases: Vec<u8>,
}

fn walk_cigar(
    cigar: &str,
    sequence: &[u8],
    qualities: Option<&[u8]>,
) -> Option<CigarWalk> {
    let mut bases = Vec::with_capacity(sequence.len());
    let mut aligned_indices = Vec::with_capacity(sequence.len());
    let mut aligned_read_bases = Vec::with_capacity(sequence.len());
    let mut read_cursor = 0usize;
    let mut ref_cursor = 0i32;

    let cigar_bytes = cigar.as_bytes();
    let mut index = 0usize;
    while index < cigar_bytes.len() {
        let digits_start = index;
        while index < cigar_bytes.len() && cigar_bytes[index].is_ascii_digit() {
            index += 1;
        }
        if index == digits_start || index == cigar_bytes.len() {
            return None;
        }
        let length = std::str::from_utf8(&cigar_bytes[digits_start..index])
            .ok()?
            .parse::<u32>()
            .ok()?;
        let op = cigar_bytes[index];
        index += 1;

        match op {
            b'M' | b'=' | b'X' => {
                for _ in 0..length {
                    if read_cursor >= sequence.len() {
                        return None;
                    }
                    bases.push(BaseObservation {
                        ref_offset: ref_cursor,
                        qual: qualities.map_or(b'!', |quals| quals[read_cursor]),
                        converted: false,
                        skip: true,
                    });
                    aligned_indices.push(bases.len() - 1);
                    aligned_read_bases.push(sequence[read_cursor]);
                    read_cursor += 1;
                    ref_cursor += 1;
                }
            }
            b'I' | b'S' => {
                for _ in 0..length {
                    if read_cursor >= sequence.len() {
                        return None;
                    }
                    bases.push(BaseObservation {
                        ref_offset: ref_cursor,
                        qual: qualities.map_or(b'!', |quals| quals[read_cursor]),
                        converted: false,
                        skip: true,
                    });
                    read_cursor += 1;
                }
            }
            b'D' | b'N' => ref_cursor += i32::try_from(length).ok()?,
            b'H' | b'P' => {}
            _ => return None,
        }
    }

    if read_cursor != sequence.len() {
        return None;
    }
    Some(CigarWalk {
        bases,
        aligned_indices,
        aligned_read_bases,
    })
}

/// Rebuilds the reference base under each aligned read base from the MD
/// tag: match runs copy the read base, mismatch letters name the
/// reference base, deletion runs (`^...`) consume no read bases.
fn reference_bases_from_md(md: &str, aligned_read_bases: &[u8]) -> Option<Vec<u8>> {
    let mut reference_bases = Vec::with_capacity(aligned_read_bases.len());
    let md_bytes = md.as_bytes();
    let mut index = 0usize;
    while index < md_bytes.len() {
        let byte = md_bytes[index];
        if byte.is_ascii_digit() {
            let mut matches = 0usize;
            while index < md_bytes.len() && md_bytes[index].is_ascii_digit() {
                matches = matches
                    .checked_mul(10)?
                    .checked_add(usize::from(md_bytes[index] - b'0'))?;
                index += 1;
            }
            for _ in 0..matches {
                let read_base = *aligned_read_bases.get(reference_bases.len())?;
                reference_bases.push(read_base);
            }
        } else if byte == b'^' {
            index += 1;
            while index < md_bytes.len() && md_bytes[index].is_ascii_alphabetic() {
                index += 1;
            }
        } else if byte.is_ascii_alphabetic() {
            if reference_bases.len() >= aligned_read_bases.len() {
                return None;
            }
            reference_bases.push(byte);
            index += 1;
        } else {
            return None;
        }
    }
    (reference_bases.len() == aligned_read_bases.len()).then_some(reference_bases)
}
