//! CLI command implementations

pub mod build;
pub mod parse;

pub use build::BuildArgs;
pub use parse::ParseArgs;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build the hybrid program graph of a file or directory
    Build(BuildArgs),

    /// Print the ESTree JSON of a file, with node ids
    Parse(ParseArgs),
}
