use crate::errors::{AppError, Result};
use crate::reference::NameStyle;
use clap::error::ErrorKind;
use clap::{ArgAction, Parser};

#[derive(Debug, Clone, Parser)]
#[command(name = "table3n", disable_version_flag = true)]
struct CliArgs {
    #[arg(short = 'a', long = "alignments")]
    alignments: Option<String>,
    #[arg(short = 'r', long = "ref")]
    reference: Option<String>,
    #[arg(short = 'o', long = "output-name", default_value = "")]
    output_name: String,
    #[arg(short = 'b', long = "base-change")]
    base_change: Option<String>,
    #[arg(short = 'u', long = "unique-only", action = ArgAction::SetTrue)]
    unique_only: bool,
    #[arg(short = 'm', long = "multiple-only", action = ArgAction::SetTrue)]
    multiple_only: bool,
    #[arg(long = "cg-only", action = ArgAction::SetTrue)]
    cg_only: bool,
    #[arg(short = 'p', long = "threads", default_value = "1")]
    threads: String,
    #[arg(long = "added-chrname", action = ArgAction::SetTrue)]
    added_chrname: bool,
    #[arg(long = "removed-chrname", action = ArgAction::SetTrue)]
    removed_chrname: bool,
    #[arg(long = "loading-block-size", default_value = "1000000")]
    loading_block_size: String,
    #[arg(long = "progress", action = ArgAction::SetTrue)]
    progress: bool,
}

/// Immutable pipeline configuration derived from the validated arguments.
/// Shared read-only by the driver, the workers and the reference window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub convert_from: u8,
    pub convert_to: u8,
    pub convert_from_complement: u8,
    pub convert_to_complement: u8,
    pub cg_only: bool,
    pub unique_only: bool,
    pub multiple_only: bool,
    pub threads: usize,
    pub loading_block_size: i64,
}

impl TableConfig {
    pub fn new(convert_from: u8, convert_to: u8) -> Self {
        Self {
            convert_from,
            convert_to,
            convert_from_complement: complement(convert_from),
            convert_to_complement: complement(convert_to),
            cg_only: false,
            unique_only: false,
            multiple_only: false,
            threads: 1,
            loading_block_size: 1_000_000,
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new(b'C', b'T')
    }
}

pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableArgs {
    pub alignments: String,
    pub reference: String,
    pub output_name: String,
    pub convert_from: u8,
    pub convert_to: u8,
    pub unique_only: bool,
    pub multiple_only: bool,
    pub cg_only: bool,
    pub threads: usize,
    pub added_chrname: bool,
    pub removed_chrname: bool,
    pub loading_block_size: i64,
    pub progress: bool,
}

impl Default for TableArgs {
    fn default() -> Self {
        Self {
            alignments: String::new(),
            reference: String::new(),
            output_name: String::new(),
            convert_from: 0,
            convert_to: 0,
            unique_only: false,
            multiple_only: false,
            cg_only: false,
            threads: 1,
            added_chrname: false,
            removed_chrname: false,
            loading_block_size: 1_000_000,
            progress: false,
        }
    }
}

impl TableArgs {
    pub fn validate(&self) -> Result<()> {
        if self.alignments.is_empty() {
            return Err(AppError::MissingRequired {
                field: "--alignments".to_string(),
            });
        }
        if self.reference.is_empty() {
            return Err(AppError::MissingRequired {
                field: "--ref".to_string(),
            });
        }
        if self.convert_from == 0 || self.convert_to == 0 {
            return Err(AppError::MissingRequired {
                field: "--base-change".to_string(),
            });
        }
        if self.unique_only && self.multiple_only {
            return Err(AppError::InvalidValue {
                flag: "--multiple-only".to_string(),
                value: "true".to_string(),
                reason: "cannot be combined with --unique-only".to_string(),
            });
        }
        if self.added_chrname && self.removed_chrname {
            return Err(AppError::InvalidValue {
                flag: "--removed-chrname".to_string(),
                value: "true".to_string(),
                reason: "cannot be combined with --added-chrname".to_string(),
            });
        }
        if self.loading_block_size < 1 {
            return Err(AppError::InvalidValue {
                flag: "--loading-block-size".to_string(),
                value: self.loading_block_size.to_string(),
                reason: "must be a positive number of base pairs".to_string(),
            });
        }
        Ok(())
    }

    pub fn config(&self) -> TableConfig {
        TableConfig {
            convert_from: self.convert_from,
            convert_to: self.convert_to,
            convert_from_complement: complement(self.convert_from),
            convert_to_complement: complement(self.convert_to),
            cg_only: self.cg_only,
            unique_only: self.unique_only,
            multiple_only: self.multiple_only,
            threads: self.threads,
            loading_block_size: self.loading_block_size,
        }
    }

    pub fn name_style(&self) -> NameStyle {
        if self.added_chrname {
            NameStyle::AddChrPrefix
        } else if self.removed_chrname {
            NameStyle::StripChrPrefix
        } else {
            NameStyle::AsIs
        }
    }
}

pub fn parse_from_env() -> Result<TableArgs> {
    parse_args(std::env::args())
}

pub fn parse_args<I, S>(args: I) -> Result<TableArgs>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut tokens: Vec<String> = args.into_iter().map(Into::into).collect();
    if tokens.is_empty() {
        tokens.push("table3n".to_string());
    }

    let cli = CliArgs::try_parse_from(tokens).map_err(map_clap_error)?;

    let (convert_from, convert_to) = match cli.base_change.as_deref() {
        Some(value) => parse_base_change(value)?,
        None => (0, 0),
    };

    let parsed = TableArgs {
        alignments: cli.alignments.unwrap_or_default(),
        reference: cli.reference.unwrap_or_default(),
        output_name: cli.output_name,
        convert_from,
        convert_to,
        unique_only: cli.unique_only,
        multiple_only: cli.multiple_only,
        cg_only: cli.cg_only,
        threads: parse_usize("--threads", &cli.threads)?.max(1),
        added_chrname: cli.added_chrname,
        removed_chrname: cli.removed_chrname,
        loading_block_size: parse_i64("--loading-block-size", &cli.loading_block_size)?,
        progress: cli.progress,
    };

    parsed.validate()?;
    Ok(parsed)
}

fn parse_base_change(value: &str) -> Result<(u8, u8)> {
    let invalid = |reason: &str| AppError::InvalidValue {
        flag: "--base-change".to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = value.split(',');
    let from = parts.next().unwrap_or_default();
    let to = parts.next().unwrap_or_default();
    if from.len() != 1 || to.len() != 1 || parts.next().is_some() {
        return Err(invalid(
            "expected two comma-separated nucleotides (e.g. C,T)",
        ));
    }

    let from = from.as_bytes()[0].to_ascii_uppercase();
    let to = to.as_bytes()[0].to_ascii_uppercase();
    if !matches!(from, b'A' | b'C' | b'G' | b'T') || !matches!(to, b'A' | b'C' | b'G' | b'T') {
        return Err(invalid("nucleotides must be one of A, C, G, T"));
    }
    Ok((from, to))
}

fn map_clap_error(error: clap::Error) -> AppError {
    let kind = error.kind();
    let rendered = error.to_string();
    match kind {
        ErrorKind::UnknownArgument => AppError::UnsupportedArgument {
            arg: first_quoted_token(&rendered).unwrap_or(rendered),
        },
        ErrorKind::TooFewValues | ErrorKind::WrongNumberOfValues => AppError::MissingValue {
            flag: first_quoted_token(&rendered).unwrap_or_else(|| "argument".to_string()),
        },
        _ => AppError::ParseError {
            message: clap_error_message(&rendered),
        },
    }
}

fn first_quoted_token(message: &str) -> Option<String> {
    let start = message.find('\'')?;
    let end = message[start + 1..].find('\'')?;
    Some(message[start + 1..start + 1 + end].to_string())
}

fn clap_error_message(message: &str) -> String {
    message
        .lines()
        .find_map(|line| line.strip_prefix("error: "))
        .or_else(|| message.lines().next())
        .unwrap_or("failed to parse arguments")
        .to_string()
}

fn parse_usize(flag: &str, value: &str) -> Result<usize> {
    value.parse::<usize>().map_err(|_| AppError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
        reason: "must be a non-negative integer".to_string(),
    })
}

fn parse_i64(flag: &str, value: &str) -> Result<i64> {
    value.parse::<i64>().map_err(|_| AppError::InvalidValue {
        flag: flag.to_string(),
        value: value.to_string(),
        reason: "must be an integer".to_string(),
    })
}
