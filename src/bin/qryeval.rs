use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use qryeval::core::config::Config;
use qryeval::core::error::Result;
use qryeval::index::corpus::MemoryCorpus;
use qryeval::search::executor::QueryExecutor;

#[derive(Parser, Debug)]
#[command(author, version, about = "Evaluate structured queries against a corpus snapshot", long_about = None)]
struct Args {
    /// Parameter file (key=value per line)
    param_file: PathBuf,

    /// Ranking file to write, overrides trecEvalOutputPath
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Evaluate queries on the rayon thread pool
    #[arg(short, long)]
    parallel: bool,
}

fn run(args: Args) -> Result<()> {
    let mut config = Config::from_file(&args.param_file)?;
    if let Some(output) = args.output {
        config.trec_eval_output_path = output;
    }
    if args.parallel {
        config.parallel = true;
    }

    let corpus = MemoryCorpus::load(&config.index_path)?;
    log::info!("Loaded corpus {} ({} documents)", config.index_path.display(), corpus.num_documents());

    let executor = QueryExecutor::new(Arc::new(corpus), config)?;
    let summary = executor.run()?;
    log::info!("Wrote {} queries in {:.3} seconds", summary.queries, summary.elapsed.as_secs_f64());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
