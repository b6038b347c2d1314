use std::fmt::Write as _;
use std::fs;
use table3n::cli::parse_args;
use tempfile::TempDir;

const CHROMOSOME_LEN: i64 = 1200;
const READ_LEN: i64 = 20;
const READ_STEP: i64 = 10;

/// `ACGT` repeated across the chromosome, wrapped at 60 columns.
fn reference_fasta() -> String {
    let mut sequence = String::new();
    for position in 0..CHROMOSOME_LEN {
        sequence.push(b"ACGT"[(position % 4) as usize] as char);
    }
    let mut fasta = String::from(">c1\n");
    for chunk in sequence.as_bytes().chunks(60) {
        fasta.push_str(std::str::from_utf8(chunk).expect("expected ascii"));
        fasta.push('\n');
    }
    fasta
}

fn read_starts() -> Vec<i64> {
    (1..=CHROMOSOME_LEN - READ_LEN + 1)
        .step_by(READ_STEP as usize)
        .collect()
}

/// Perfect-match tiling reads over the reference.
fn alignments_sam() -> String {
    let mut sam = String::from("@HD\tVN:1.6\tSO:coordinate\n@SQ\tSN:c1\tLN:1200\n");
    for start in read_starts() {
        let mut sequence = String::new();
        for offset in 0..READ_LEN {
            let position = start + offset - 1;
            sequence.push(b"ACGT"[(position % 4) as usize] as char);
        }
        let qualities = "I".repeat(READ_LEN as usize);
        writeln!(
            sam,
            "r{start}\t0\tc1\t{start}\t60\t{READ_LEN}M\t*\t0\t0\t{sequence}\t{qualities}\tMD:Z:{READ_LEN}"
        )
        .expect("expected sam line");
    }
    sam
}

fn coverage_at(position: i64) -> usize {
    read_starts()
        .iter()
        .filter(|&&start| start <= position && position < start + READ_LEN)
        .count()
}

#[test]
fn tiled_reads_across_many_block_slides_tabulate_exactly() {
    let dir = TempDir::new().expect("expected tempdir");
    let reference_path = dir.path().join("genome.fa");
    let alignments_path = dir.path().join("aligned.sam");
    let output_path = dir.path().join("out.tsv");
    fs::write(&reference_path, reference_fasta()).expect("expected reference write");
    fs::write(&alignments_path, alignments_sam()).expect("expected alignment write");

    let args = parse_args([
        "table3n",
        "-a",
        &alignments_path.to_string_lossy(),
        "-r",
        &reference_path.to_string_lossy(),
        "-b",
        "C,T",
        "-o",
        &output_path.to_string_lossy(),
        "-p",
        "4",
        "--loading-block-size",
        "100",
    ])
    .expect("expected parse success");
    table3n::run_from_args(args).expect("expected run success");

    let content = fs::read_to_string(&output_path).expect("expected output file");
    let mut lines = content.lines();
    lines.next().expect("expected header");

    let mut last_position = 0i64;
    let mut rows = 0usize;
    for line in lines {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 7, "malformed row: {line}");
        assert_eq!(fields[0], "c1");

        let position: i64 = fields[1].parse().expect("expected numeric position");
        assert!(
            position > last_position,
            "rows must ascend: {position} after {last_position}"
        );
        last_position = position;

        // Forward perfect-match reads only ever report C positions.
        assert_eq!(position % 4, 2, "unexpected position {position}");
        assert_eq!(fields[2], "+");
        assert_eq!(fields[3], "");
        assert_eq!(fields[4], "0");

        let expected = coverage_at(position);
        assert_eq!(
            fields[6],
            expected.to_string(),
            "coverage mismatch at {position}"
        );
        assert_eq!(fields[5].len(), expected, "quality string length mismatch");
        assert!(fields[5].bytes().all(|byte| byte == b'I'));
        rows += 1;
    }

    // Every C position in 1..=1200 is covered by at least one read.
    assert_eq!(rows, (CHROMOSOME_LEN / 4) as usize);
}

#[test]
fn single_thread_and_many_threads_produce_identical_tables() {
    let dir = TempDir::new().expect("expected tempdir");
    let reference_path = dir.path().join("genome.fa");
    let alignments_path = dir.path().join("aligned.sam");
    fs::write(&reference_path, reference_fasta()).expect("expected reference write");
    fs::write(&alignments_path, alignments_sam()).expect("expected alignment write");

    let mut outputs = Vec::new();
    for (label, threads) in [("one", "1"), ("four", "4")] {
        let output_path = dir.path().join(format!("out_{label}.tsv"));
        let args = parse_args([
            "table3n",
            "-a",
            &alignments_path.to_string_lossy(),
            "-r",
            &reference_path.to_string_lossy(),
            "-b",
            "C,T",
            "-o",
            &output_path.to_string_lossy(),
            "-p",
            threads,
            "--loading-block-size",
            "250",
        ])
        .expect("expected parse success");
        table3n::run_from_args(args).expect("expected run success");
        outputs.push(fs::read_to_string(&output_path).expect("expected output file"));
    }

    assert_eq!(outputs[0], outputs[1]);
}
