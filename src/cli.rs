use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};

pub const DEFAULT_CHEMBL_URL: &str = "https://www.ebi.ac.uk/chembl/api/data";
pub const DEFAULT_MONTHLY_BASE_URL: &str = "https://drughunter.com/molecules-of-the-month";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SEGMENTER_CMD: &str = "decimer-segment";
pub const DEFAULT_PRIMARY_CMD: &str = "molscribe-recognize";
pub const DEFAULT_COMPLEMENT_CMD: &str = "decimer-recognize";

#[derive(Parser, Debug)]
#[command(
    name = "molhunt",
    version,
    about = "Chemical structure extraction from document pages with dual-recognizer reconciliation"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    Extract(ExtractArgs),
    Validate(ValidateArgs),
}

#[derive(Args, Debug, Clone)]
#[command(group(
    ArgGroup::new("target")
        .required(true)
        .args(["url", "year", "input_dir"])
))]
pub struct ExtractArgs {
    #[arg(short, long)]
    pub url: Option<String>,

    #[arg(short, long)]
    pub year: Option<i32>,

    #[arg(short, long, requires = "year")]
    pub month: Option<String>,

    #[arg(long)]
    pub input_dir: Option<PathBuf>,

    #[arg(long, default_value = DEFAULT_MONTHLY_BASE_URL)]
    pub base_url: String,

    #[arg(long, default_value_t = false)]
    pub text: bool,

    #[arg(long, value_enum, default_value_t = TextDirection::Right)]
    pub direction: TextDirection,

    #[arg(long, default_value = "|")]
    pub separator: String,

    #[arg(long, default_value_t = false)]
    pub complement_off: bool,

    #[arg(long, value_enum, default_value_t = ComplementPolicy::Invalid)]
    pub complement_policy: ComplementPolicy,

    #[arg(long)]
    pub seg_dir: Option<PathBuf>,

    #[arg(long, default_value = ".")]
    pub output_dir: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    pub output_format: OutputFormat,

    #[arg(long, default_value = DEFAULT_SEGMENTER_CMD)]
    pub segmenter_cmd: String,

    #[arg(long, default_value = DEFAULT_PRIMARY_CMD)]
    pub primary_cmd: String,

    #[arg(long, default_value = DEFAULT_COMPLEMENT_CMD)]
    pub complement_cmd: String,

    #[command(flatten)]
    pub validation: ValidationOptions,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    #[arg(required = true)]
    pub inchikeys: Vec<String>,

    #[arg(long, default_value_t = false)]
    pub json: bool,

    #[command(flatten)]
    pub validation: ValidationOptions,
}

#[derive(Args, Debug, Clone)]
pub struct ValidationOptions {
    #[arg(long, default_value = DEFAULT_CHEMBL_URL)]
    pub chembl_url: String,

    #[arg(long, default_value_t = DEFAULT_HTTP_TIMEOUT_SECS)]
    pub http_timeout_secs: u64,

    #[arg(long)]
    pub validation_cache: Option<PathBuf>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum TextDirection {
    Right,
    Left,
    Top,
    Bottom,
}

impl TextDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Right => "right",
            Self::Left => "left",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

/// Which primary outcomes get a second attempt with the complement recognizer.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, ValueEnum)]
pub enum ComplementPolicy {
    /// Only segments the validator rejected.
    #[default]
    Invalid,
    /// Rejected segments plus those the validator could not check.
    InvalidOrUnchecked,
}

impl ComplementPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "invalid",
            Self::InvalidOrUnchecked => "invalid-or-unchecked",
        }
    }

    pub fn wants_complement(self, validated: Option<bool>) -> bool {
        match self {
            Self::Invalid => validated == Some(false),
            Self::InvalidOrUnchecked => validated != Some(true),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum OutputFormat {
    Csv,
    Sqlite,
}

impl OutputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sqlite => "sqlite",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sqlite => "sqlite",
        }
    }
}
