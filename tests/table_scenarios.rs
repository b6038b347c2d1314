use std::fs;
use std::path::Path;
use table3n::cli::parse_args;
use table3n::errors::AppError;
use tempfile::TempDir;

const HEADER: &str =
    "ref\tpos\tstrand\tconvertedBaseQualities\tconvertedBaseCount\tunconvertedBaseQualities\tunconvertedBaseCount";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new(reference: &str, alignments: &str) -> Self {
        let dir = TempDir::new().expect("expected tempdir");
        fs::write(dir.path().join("genome.fa"), reference).expect("expected reference write");
        fs::write(dir.path().join("aligned.sam"), alignments).expect("expected alignment write");
        Self { dir }
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().to_string()
    }

    fn run(&self, extra: &[&str]) -> Result<Vec<String>, AppError> {
        let output = self.path("out.tsv");
        let mut tokens = vec![
            "table3n".to_string(),
            "-a".to_string(),
            self.path("aligned.sam"),
            "-r".to_string(),
            self.path("genome.fa"),
            "-b".to_string(),
            "C,T".to_string(),
            "-o".to_string(),
            output.clone(),
        ];
        tokens.extend(extra.iter().map(ToString::to_string));

        let args = parse_args(tokens)?;
        table3n::run_from_args(args)?;
        Ok(read_rows(Path::new(&output)))
    }
}

fn read_rows(path: &Path) -> Vec<String> {
    let content = fs::read_to_string(path).expect("expected output file");
    let mut lines = content.lines();
    assert_eq!(lines.next(), Some(HEADER), "expected the table header");
    lines.map(ToString::to_string).collect()
}

#[test]
fn single_converted_read_yields_one_forward_row() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        "@HD\tVN:1.6\tSO:coordinate\nr1\t0\tc1\t2\t60\t3M\t*\t0\t0\tTGT\tIII\tMD:Z:0C2\n",
    );
    let rows = workspace.run(&[]).expect("expected run success");
    assert_eq!(rows, vec!["c1\t2\t+\tI\t1\t\t0".to_string()]);
}

#[test]
fn single_unconverted_read_yields_one_forward_row() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        "r1\t0\tc1\t2\t60\t3M\t*\t0\t0\tCGT\tFFF\tMD:Z:3\n",
    );
    let rows = workspace.run(&[]).expect("expected run success");
    assert_eq!(rows, vec!["c1\t2\t+\t\t0\tF\t1".to_string()]);
}

#[test]
fn duplicate_read_observations_count_once() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        concat!(
            "r7\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tI\tMD:Z:0C0\n",
            "r7\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tJ\tMD:Z:0C0\n",
        ),
    );
    let rows = workspace.run(&[]).expect("expected run success");
    assert_eq!(rows, vec!["c1\t2\t+\tI\t1\t\t0".to_string()]);
}

#[test]
fn contradictory_read_is_retracted_and_the_position_dropped() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        concat!(
            "r7\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tI\tMD:Z:0C0\n",
            "r7\t0\tc1\t2\t60\t1M\t*\t0\t0\tC\tF\tMD:Z:1\n",
        ),
    );
    let rows = workspace.run(&[]).expect("expected run success");
    assert!(rows.is_empty(), "expected no rows, got {rows:?}");
}

#[test]
fn retraction_keeps_other_reads_contributions() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        concat!(
            "r7\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tI\tMD:Z:0C0\n",
            "r8\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tK\tMD:Z:0C0\n",
            "r7\t0\tc1\t2\t60\t1M\t*\t0\t0\tC\tF\tMD:Z:1\n",
        ),
    );
    let rows = workspace.run(&[]).expect("expected run success");
    assert_eq!(rows, vec!["c1\t2\t+\tK\t1\t\t0".to_string()]);
}

#[test]
fn cg_only_mode_reports_the_cg_dinucleotide() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        "r1\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tH\tMD:Z:0C0\n",
    );
    let rows = workspace.run(&["--cg-only"]).expect("expected run success");
    assert_eq!(rows, vec!["c1\t2\t+\tH\t1\t\t0".to_string()]);
}

#[test]
fn outside_cg_context_nothing_is_reported_in_cg_only_mode() {
    // The only C sits before a T, so no position is classified.
    let workspace = Workspace::new(
        ">c1\nACTT\n",
        "r1\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tH\tMD:Z:0C0\n",
    );
    let rows = workspace.run(&["--cg-only"]).expect("expected run success");
    assert!(rows.is_empty(), "expected no rows, got {rows:?}");
}

#[test]
fn reverse_strand_evidence_lands_on_minus_positions() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        "r1\t16\tc1\t3\t60\t1M\t*\t0\t0\tA\tQ\tMD:Z:0G0\n",
    );
    let rows = workspace.run(&[]).expect("expected run success");
    assert_eq!(rows, vec!["c1\t3\t-\tQ\t1\t\t0".to_string()]);
}

#[test]
fn chromosomes_flush_in_input_order() {
    let workspace = Workspace::new(
        ">c1\nACGT\n>c2\nCCCC\n",
        concat!(
            "r1\t0\tc1\t2\t60\t1M\t*\t0\t0\tC\tI\tMD:Z:1\n",
            "r2\t0\tc2\t1\t60\t2M\t*\t0\t0\tCC\tJJ\tMD:Z:2\n",
            "r3\t0\tc2\t4\t60\t1M\t*\t0\t0\tT\tK\tMD:Z:0C0\n",
        ),
    );
    let rows = workspace.run(&["-p", "2"]).expect("expected run success");
    assert_eq!(
        rows,
        vec![
            "c1\t2\t+\t\t0\tI\t1".to_string(),
            "c2\t1\t+\t\t0\tJ\t1".to_string(),
            "c2\t2\t+\t\t0\tJ\t1".to_string(),
            "c2\t4\t+\tK\t1\t\t0".to_string(),
        ]
    );
}

#[test]
fn many_duplicate_records_still_count_once() {
    let mut alignments = String::new();
    for _ in 0..50 {
        alignments.push_str("dup\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tI\tMD:Z:0C0\n");
    }
    let workspace = Workspace::new(">c1\nACGT\n", &alignments);
    let rows = workspace.run(&["-p", "2"]).expect("expected run success");
    assert_eq!(rows, vec!["c1\t2\t+\tI\t1\t\t0".to_string()]);
}

#[test]
fn unique_only_ignores_multimapped_records() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        concat!(
            "r1\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tI\tMD:Z:0C0\tNH:i:4\n",
            "r2\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tJ\tMD:Z:0C0\tNH:i:1\n",
        ),
    );
    let rows = workspace.run(&["-u"]).expect("expected run success");
    assert_eq!(rows, vec!["c1\t2\t+\tJ\t1\t\t0".to_string()]);
}

#[test]
fn unsorted_positions_on_one_chromosome_fail() {
    let workspace = Workspace::new(
        ">c1\nACGTACGT\n",
        concat!(
            "r1\t0\tc1\t6\t60\t1M\t*\t0\t0\tT\tI\tMD:Z:0C0\n",
            "r2\t0\tc1\t2\t60\t1M\t*\t0\t0\tT\tI\tMD:Z:0C0\n",
        ),
    );
    let result = workspace.run(&[]);
    assert!(matches!(result, Err(AppError::InputNotSorted { .. })));
}

#[test]
fn alignment_to_an_unknown_chromosome_fails() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        "r1\t0\tc9\t2\t60\t1M\t*\t0\t0\tT\tI\tMD:Z:0C0\n",
    );
    let result = workspace.run(&[]);
    assert!(matches!(result, Err(AppError::UnknownChromosome { .. })));
}

#[test]
fn missing_reference_file_fails_to_open() {
    let workspace = Workspace::new(">c1\nACGT\n", "");
    let output = workspace.path("out.tsv");
    let args = parse_args([
        "table3n",
        "-a",
        &workspace.path("aligned.sam"),
        "-r",
        &workspace.path("no-such.fa"),
        "-b",
        "C,T",
        "-o",
        &output,
    ])
    .expect("expected parse success");
    let result = table3n::run_from_args(args);
    assert!(matches!(result, Err(AppError::OpenFailed { .. })));
}

#[test]
fn header_only_lines_and_unmapped_records_produce_an_empty_table() {
    let workspace = Workspace::new(
        ">c1\nACGT\n",
        concat!(
            "@HD\tVN:1.6\tSO:coordinate\n",
            "@SQ\tSN:c1\tLN:4\n",
            "r1\t4\t*\t0\t0\t*\t*\t0\t0\tACGT\tIIII\n",
        ),
    );
    let rows = workspace.run(&[]).expect("expected run success");
    assert!(rows.is_empty());
}

#[test]
fn gzipped_inputs_stream_like_plain_ones() {
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    let workspace = Workspace::new(">c1\nACGT\n", "");
    let sam = "r1\t0\tc1\t2\t60\t3M\t*\t0\t0\tTGT\tIII\tMD:Z:0C2\n";
    let gz_path = workspace.path("aligned.sam.gz");
    let mut encoder = GzEncoder::new(
        fs::File::create(&gz_path).expect("expected gz create"),
        Compression::default(),
    );
    encoder
        .write_all(sam.as_bytes())
        .expect("expected gz write");
    encoder.finish().expect("expected gz finish");

    let output = workspace.path("out.tsv");
    let args = parse_args([
        "table3n",
        "-a",
        &gz_path,
        "-r",
        &workspace.path("genome.fa"),
        "-b",
        "C,T",
        "-o",
        &output,
    ])
    .expect("expected parse success");
    table3n::run_from_args(args).expect("expected run success");

    let rows = read_rows(Path::new(&output));
    assert_eq!(rows, vec!["c1\t2\t+\tI\t1\t\t0".to_string()]);
}
