//! Command-line interface for diffexpr

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "diffexpr")]
#[command(version)]
#[command(about = "Differential gene expression analysis of RNA-seq counts")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full analysis and write every output table
    #[command(
        long_about = "Run the full analysis.\n\n\
            Estimates size factors and dispersions, fits full and reduced negative\n\
            binomial models, runs the likelihood ratio test and one Wald test per\n\
            contrast, then writes results, summaries, the variance-stabilized matrix,\n\
            RLE, PCA and covariate correlations into the output directory.",
        after_long_help = "\
Examples:
  # Two-group comparison with defaults
  diffexpr run -c counts.tsv -s samples.tsv -o results/ --design \"~ condition\"

  # Batch-corrected design with a configuration file
  diffexpr run -c counts.tsv -s samples.tsv -o results/ --config analysis.json"
    )]
    Run {
        /// Count table: gene IDs in the first column, one column per sample
        #[arg(short, long)]
        counts: String,

        /// Sample table: sample IDs in the first column, one column per covariate
        #[arg(short, long)]
        samples: String,

        /// JSON analysis configuration
        #[arg(long)]
        config: Option<String>,

        /// Output directory, created if missing
        #[arg(short, long, default_value = "diffexpr_out")]
        output: String,

        /// Full design formula, overrides the configuration
        #[arg(short, long)]
        design: Option<String>,

        /// Reduced design formula for the likelihood ratio test
        #[arg(short, long)]
        reduced: Option<String>,

        /// Adjusted p-value threshold
        #[arg(short, long)]
        alpha: Option<f64>,

        /// Number of threads (0 = all cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Estimate size factors and write normalized counts
    #[command(after_long_help = "\
Examples:
  diffexpr normalize -c counts.tsv -o normalized/
  diffexpr normalize -c counts.tsv -o normalized/ -m poscounts")]
    Normalize {
        /// Count table
        #[arg(short, long)]
        counts: String,

        /// Output directory, created if missing
        #[arg(short, long, default_value = "diffexpr_out")]
        output: String,

        /// Size factor method
        #[arg(short, long, default_value = "ratio", value_parser = ["ratio", "poscounts"])]
        method: String,
    },

    /// Write variance-stabilized counts and relative log expression
    #[command(
        long_about = "Apply the variance-stabilizing transform.\n\n\
            Dispersions are estimated under the full design; when the dispersion\n\
            trend cannot be fitted and fallback is allowed, log2(count + pseudocount)\n\
            is written instead."
    )]
    Vst {
        /// Count table
        #[arg(short, long)]
        counts: String,

        /// Sample table
        #[arg(short, long)]
        samples: String,

        /// JSON analysis configuration
        #[arg(long)]
        config: Option<String>,

        /// Output directory, created if missing
        #[arg(short, long, default_value = "diffexpr_out")]
        output: String,

        /// Design formula, overrides the configuration
        #[arg(short, long)]
        design: Option<String>,

        /// Ignore the design and estimate dispersions under `~ 1`
        #[arg(long)]
        blind: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "diffexpr", "-v", "run", "-c", "counts.tsv", "-s", "samples.tsv", "--design", "~ batch + condition", "-j",
            "4",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Commands::Run {
                counts,
                design,
                threads,
                output,
                ..
            } => {
                assert_eq!(counts, "counts.tsv");
                assert_eq!(design.as_deref(), Some("~ batch + condition"));
                assert_eq!(threads, Some(4));
                assert_eq!(output, "diffexpr_out");
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_normalize_rejects_unknown_method() {
        let parsed = Cli::try_parse_from(["diffexpr", "normalize", "-c", "counts.tsv", "-m", "tmm"]);
        assert!(parsed.is_err());
    }
}
