//! diffexpr command-line interface

use std::path::{Path, PathBuf};

use clap::Parser;
use log::{info, LevelFilter};

use diffexpr::cli::{Cli, Commands};
use diffexpr::io::{
    write_calls, write_correlation, write_dispersions, write_grid, write_matrix, write_overlap, write_pca,
    write_results, write_rle, write_size_factors, write_summary,
};
use diffexpr::prelude::*;

fn main() {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Commands::Run {
            counts,
            samples,
            config,
            output,
            design,
            reduced,
            alpha,
            threads,
        } => {
            let overrides = Overrides {
                design,
                reduced,
                alpha,
                threads,
            };
            run_command(&counts, &samples, config.as_deref(), &output, overrides)
        }
        Commands::Normalize { counts, output, method } => run_normalize(&counts, &output, &method),
        Commands::Vst {
            counts,
            samples,
            config,
            output,
            design,
            blind,
        } => run_vst(&counts, &samples, config.as_deref(), &output, design, blind),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Command-line values that take precedence over the configuration file.
#[derive(Default)]
struct Overrides {
    design: Option<String>,
    reduced: Option<String>,
    alpha: Option<f64>,
    threads: Option<usize>,
}

fn load_config(path: Option<&str>, overrides: Overrides) -> Result<AnalysisConfig> {
    let mut config = match path {
        Some(p) => {
            info!("Loading configuration from: {}", p);
            AnalysisConfig::from_json_file(p)?
        }
        None => AnalysisConfig::default(),
    };
    if let Some(design) = overrides.design {
        config.full_design = design;
    }
    if let Some(reduced) = overrides.reduced {
        config.reduced_design = reduced;
    }
    if let Some(alpha) = overrides.alpha {
        config.alpha = alpha;
    }
    if let Some(threads) = overrides.threads {
        config.threads = threads;
    }
    config.validate()?;
    Ok(config)
}

fn output_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Comparison names become file names; keep them portable.
fn file_stem(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

fn load_inputs(counts_path: &str, samples_path: &str, config: &AnalysisConfig) -> Result<(CountMatrix, SampleMetadata)> {
    info!("Loading count table from: {}", counts_path);
    let counts = read_count_table(counts_path)?;
    info!("  {} genes, {} samples", counts.n_genes(), counts.n_samples());

    info!("Loading sample table from: {}", samples_path);
    let metadata = read_sample_table(samples_path, &config.covariates)?;
    info!("  {} samples, {} covariates", metadata.n_samples(), metadata.covariates().len());
    Ok((counts, metadata))
}

fn run_command(
    counts_path: &str,
    samples_path: &str,
    config_path: Option<&str>,
    output: &str,
    overrides: Overrides,
) -> Result<()> {
    let config = load_config(config_path, overrides)?;
    let (counts, metadata) = load_inputs(counts_path, samples_path, &config)?;
    let dir = output_dir(output)?;

    info!("Design: {} (reduced: {})", config.full_design, config.reduced_design);
    let analysis = run_analysis(counts, &metadata, &config)?;

    write_size_factors(dir.join("size_factors.tsv"), analysis.counts.sample_ids(), &analysis.size_factors)?;
    write_dispersions(dir.join("dispersions.tsv"), analysis.counts.gene_ids(), &analysis.dispersions)?;
    for result in &analysis.results {
        let path = dir.join(format!("results_{}.tsv", file_stem(&result.name)));
        write_results(&path, result, &analysis.dispersions)?;
    }

    let summaries = analysis.summarize(&config);
    for s in &summaries {
        let (up, down, ns) = s.counts();
        info!("{}: {} up, {} down, {} not significant", s.comparison, up, down, ns);
    }
    write_summary(dir.join("summary.tsv"), &summaries)?;
    write_calls(dir.join("calls.tsv"), &summaries)?;
    write_grid(dir.join("threshold_grid.tsv"), &summaries)?;

    let overlap = analysis.overlap(&config, Direction::Any)?;
    write_overlap(dir.join("overlap_pairwise.tsv"), dir.join("overlap_genes.tsv"), &overlap)?;

    let transformed = analysis.transform(&config)?;
    write_transformed(&dir, &transformed)?;

    let (pca, correlation) = analysis.diagnostics(&transformed, &config)?;
    write_pca(dir.join("pca_coordinates.tsv"), dir.join("pca_variance.tsv"), &pca)?;
    write_correlation(dir.join("pc_covariate_correlation.tsv"), &correlation)?;

    info!("Wrote results to {}", dir.display());
    Ok(())
}

fn write_transformed(dir: &Path, transformed: &TransformedMatrix) -> Result<()> {
    let name = match transformed.kind {
        TransformKind::Parametric => "vst.tsv",
        TransformKind::LogFallback => "log2_counts.tsv",
    };
    write_matrix(
        dir.join(name),
        "gene_id",
        &transformed.gene_ids,
        &transformed.sample_ids,
        &transformed.values,
    )?;

    let rle = relative_log_expression(transformed);
    write_matrix(dir.join("rle.tsv"), "gene_id", &rle.gene_ids, &rle.sample_ids, &rle.values)?;
    write_rle(dir.join("rle_medians.tsv"), &rle)
}

fn run_normalize(counts_path: &str, output: &str, method: &str) -> Result<()> {
    let method = match method {
        "ratio" => SizeFactorMethod::Ratio,
        "poscounts" => SizeFactorMethod::PosCounts,
        other => {
            return Err(DiffExprError::InvalidConfig {
                reason: format!("unknown size factor method: {}", other),
            })
        }
    };

    info!("Loading count table from: {}", counts_path);
    let counts = read_count_table(counts_path)?;
    info!("  {} genes, {} samples", counts.n_genes(), counts.n_samples());
    let dir = output_dir(output)?;

    let size_factors = estimate_size_factors(&counts, method)?;
    let normalized = size_factors.normalize(&counts)?;

    write_size_factors(dir.join("size_factors.tsv"), counts.sample_ids(), &size_factors)?;
    write_matrix(
        dir.join("normalized_counts.tsv"),
        "gene_id",
        counts.gene_ids(),
        counts.sample_ids(),
        &normalized,
    )?;
    info!("Wrote normalized counts to {}", dir.display());
    Ok(())
}

fn run_vst(
    counts_path: &str,
    samples_path: &str,
    config_path: Option<&str>,
    output: &str,
    design: Option<String>,
    blind: bool,
) -> Result<()> {
    let overrides = Overrides {
        design: if blind { Some("~ 1".to_string()) } else { design },
        ..Overrides::default()
    };
    let config = load_config(config_path, overrides)?;
    let (counts, metadata) = load_inputs(counts_path, samples_path, &config)?;
    let metadata = metadata.aligned_to(counts.sample_ids())?;
    let dir = output_dir(output)?;

    info!("Estimating dispersions under {}", config.full_design);
    let formula = Formula::parse(&config.full_design)?;
    let matrix = ModelMatrix::build(&formula, &metadata)?;
    let pool = config.thread_pool()?;

    let size_factors = estimate_size_factors(&counts, config.size_factor_method)?;
    let dispersions = estimate_dispersions(&counts, &size_factors, &matrix, &config.dispersion, &pool)?;
    let transformed = variance_stabilize(&counts, &size_factors, &dispersions, config.vst_pseudocount)?;

    write_size_factors(dir.join("size_factors.tsv"), counts.sample_ids(), &size_factors)?;
    write_transformed(&dir, &transformed)?;
    info!("Wrote transformed counts to {}", dir.display());
    Ok(())
}
