#![forbid(unsafe_code)]

//! # oddsloop
//!
//! A closed-loop optimization harness for prediction-market prompt templates.
//!
//! The loop: test a candidate template against resolved market data, score
//! every relationship claim it makes against real outcomes, distill the wins
//! into few-shot exemplars and the losses into failure warnings, splice both
//! back into the template, optionally have a stronger model rewrite the
//! weakest section, and retest, keeping the best candidate seen until the
//! quality targets are met or the iteration budget runs out.
//!
//! The generative service and the market-data provider sit behind traits
//! ([`gateway::ChatGateway`], [`markets::MarketProvider`]) so the whole loop
//! runs deterministically under scripted collaborators in tests.

pub mod config;
pub mod evaluator;
pub mod exemplars;
pub mod gateway;
pub mod markets;
pub mod mutator;
pub mod optimizer;
pub mod report;
pub mod template;
pub mod tester;

pub use config::OptimizerConfig;
pub use evaluator::{evaluate, Outcome, Relationship, Verdict};
pub use gateway::{Attribution, ChatGateway, OpenAiAdapter};
pub use markets::{fetch_topic_groups, GammaMarkets, Market, MarketGroup, MarketProvider};
pub use optimizer::{IterationRecord, OptimizationOutcome, OptimizeError, Optimizer};
pub use template::CandidateTemplate;
pub use tester::{CandidateTester, Prediction, TestCaseResult, TestRun};
