//! `tsearch search`: hybrid search from the command line.

use anyhow::Result;

use template_search_core::search::SearchRequest;
use template_search_core::{MatchType, RankedResult, TemplateType};

use crate::config::Config;
use crate::engine::HybridEngine;

pub struct SearchArgs {
    pub query: String,
    pub template_type: Option<TemplateType>,
    pub limit: Option<i64>,
    pub min_similarity: Option<f64>,
    pub json: bool,
}

pub async fn run_search(config: &Config, args: SearchArgs) -> Result<()> {
    let req = SearchRequest::new(args.query)
        .with_type(args.template_type)
        .with_limit(args.limit.unwrap_or(config.retrieval.default_limit))
        .with_min_similarity(
            args.min_similarity
                .unwrap_or(config.retrieval.min_similarity),
        );

    let engine = HybridEngine::from_config(config).await?;
    let results = engine.search(&req).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        println!("(run `tsearch list` to browse the full catalog)");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        print_result(i + 1, result);
    }

    Ok(())
}

fn print_result(rank: usize, result: &RankedResult) {
    let t = &result.template;
    let score = match result.match_type {
        MatchType::Fulltext => "keyword".to_string(),
        MatchType::Vector | MatchType::Both => format!("{:.2}%", result.similarity),
    };
    println!(
        "{}. [{} {}] {} ({})",
        rank, result.match_type, score, t.title, t.template_type
    );
    println!("    id: {}", t.id);
    if !t.best_use_case.is_empty() {
        println!("    best for: {}", t.best_use_case);
    }
    println!("    repo: {}", t.github_url);
    println!();
}
