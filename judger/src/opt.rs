use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[clap(name = "conquer", version, about)]
pub struct Opts {
    #[clap(subcommand)]
    pub cmd: SubCmd,

    #[clap(flatten)]
    pub opt: GlobalOpts,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Configuration file, in TOML. Environment variables override its values.
    #[clap(long, short, global = true, value_name = "path")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCmd {
    /// Judge a submission against a file of test cases
    #[clap(name = "run")]
    Run(RunSubCmd),

    /// Estimate the time complexity of a submission
    #[clap(name = "analyze")]
    Analyze(AnalyzeSubCmd),

    /// Run a submission once with the given arguments
    #[clap(name = "exec")]
    Exec(ExecSubCmd),

    /// Build or pull the sandbox images
    #[clap(name = "images")]
    Images(ImagesSubCmd),

    /// Remove sandboxes left behind by a process that did not exit cleanly
    #[clap(name = "cleanup")]
    Cleanup,
}

#[derive(Args, Debug, Clone)]
pub struct Submission {
    /// Language of the submission, e.g. `python`, `cpp`, `go`
    #[clap(long, short)]
    pub lang: String,

    /// Source file defining `solution`
    #[clap(long, value_name = "path")]
    pub code: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct RunSubCmd {
    #[clap(flatten)]
    pub submission: Submission,

    /// JSON file holding an array of `{ "input": [...], "expectedOutput": ... }`
    #[clap(long, value_name = "path")]
    pub cases: PathBuf,

    /// Timeout of each case in milliseconds, instead of the language default
    #[clap(long, value_name = "ms")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct AnalyzeSubCmd {
    #[clap(flatten)]
    pub submission: Submission,

    /// JSON file holding an array of test cases
    #[clap(long, value_name = "path")]
    pub cases: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ExecSubCmd {
    #[clap(flatten)]
    pub submission: Submission,

    /// Arguments of `solution`, as a JSON array
    #[clap(long, value_name = "json")]
    pub input: String,

    /// Timeout in milliseconds, instead of the language default
    #[clap(long, value_name = "ms")]
    pub timeout: Option<u64>,
}

#[derive(Args, Debug, Clone)]
pub struct ImagesSubCmd {
    /// Languages to prepare. Defaults to all of them.
    #[clap(name = "lang")]
    pub langs: Vec<String>,

    /// Give up on an image after this many seconds
    #[clap(long, value_name = "secs")]
    pub timeout: Option<u64>,
}
