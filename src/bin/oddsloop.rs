#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use oddsloop::config::{default_topics, OptimizerConfig};
use oddsloop::gateway::OpenAiAdapter;
use oddsloop::markets::{fetch_topic_groups, GammaMarkets, MarketProvider};
use oddsloop::optimizer::Optimizer;
use oddsloop::report::write_artifacts;

#[derive(Parser)]
#[command(name = "oddsloop", version, about = "Prediction-market prompt optimization loop")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full optimization loop and write artifacts
    Run {
        /// Directory for run artifacts
        #[arg(long, default_value = "output")]
        out_dir: PathBuf,
        /// Maximum refinement rounds after the baseline
        #[arg(long)]
        max_iterations: Option<usize>,
        /// Target accuracy in percent
        #[arg(long)]
        target_accuracy: Option<f64>,
        /// Target mean profit score
        #[arg(long)]
        target_score: Option<f64>,
        /// Source markets tested per topic
        #[arg(long)]
        tests_per_topic: Option<usize>,
        /// Candidate markets offered per test
        #[arg(long)]
        candidates_per_test: Option<usize>,
        /// Few-shot exemplars per iteration
        #[arg(long)]
        few_shot: Option<usize>,
        /// Model that executes candidates
        #[arg(long)]
        model: Option<String>,
        /// Model that rewrites definitions
        #[arg(long)]
        mutation_model: Option<String>,
        /// Comma-separated topic keywords
        #[arg(long, value_delimiter = ',')]
        topics: Option<Vec<String>>,
        /// Markets requested per topic
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Preview the topic-grouped market data without running the loop
    Markets {
        /// Comma-separated topic keywords
        #[arg(long, value_delimiter = ',')]
        topics: Option<Vec<String>>,
        /// Markets requested per topic
        #[arg(long, default_value_t = 100)]
        limit: usize,
        /// Fetch open markets instead of resolved ones
        #[arg(long)]
        open: bool,
    },
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            out_dir,
            max_iterations,
            target_accuracy,
            target_score,
            tests_per_topic,
            candidates_per_test,
            few_shot,
            model,
            mutation_model,
            topics,
            limit,
        } => {
            let defaults = OptimizerConfig::default();
            let config = OptimizerConfig {
                max_iterations: max_iterations.unwrap_or(defaults.max_iterations),
                target_accuracy: target_accuracy.unwrap_or(defaults.target_accuracy),
                target_score: target_score.unwrap_or(defaults.target_score),
                tests_per_topic: tests_per_topic.unwrap_or(defaults.tests_per_topic),
                candidates_per_test: candidates_per_test.unwrap_or(defaults.candidates_per_test),
                few_shot_examples: few_shot.unwrap_or(defaults.few_shot_examples),
                model: model.unwrap_or(defaults.model),
                mutation_model: mutation_model.unwrap_or(defaults.mutation_model),
                topics: topics.unwrap_or(defaults.topics),
                fetch_limit: limit.unwrap_or(defaults.fetch_limit),
            };

            let gateway = Arc::new(OpenAiAdapter::from_env()?);
            let provider = GammaMarkets::new()?;
            let groups =
                fetch_topic_groups(&provider, &config.topics, config.fetch_limit).await?;

            let optimizer = Optimizer::new(config.clone(), gateway);
            let outcome = optimizer.run(&groups).await?;

            let paths = write_artifacts(&out_dir, &config, &outcome)?;

            println!("Optimization complete");
            println!(
                "  Best accuracy:    {:.1}%  (baseline {:.1}%)",
                outcome.best_accuracy, outcome.history[0].accuracy
            );
            println!(
                "  Best mean score:  {:+.2}  (baseline {:+.2})",
                outcome.best_mean_score, outcome.history[0].mean_score
            );
            println!("  Iterations:       {}", outcome.history.len() - 1);
            println!("  Best prompt:      {}", paths.best_prompt.display());
            println!("  Report:           {}", paths.report_md.display());
        }
        Commands::Markets { topics, limit, open } => {
            let topics = topics.unwrap_or_else(default_topics);
            let provider = GammaMarkets::new()?;

            for topic in &topics {
                let markets = provider.fetch(topic, limit, !open).await?;
                println!("{topic}: {} markets", markets.len());
                for m in markets.iter().take(5) {
                    println!(
                        "  [{}] {} ({}% YES)",
                        m.outcome.as_str(),
                        m.question,
                        m.yes_price
                    );
                }
            }
        }
    }

    Ok(())
}
