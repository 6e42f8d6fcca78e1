//! `tsearch get` and `tsearch list`: direct catalog reads.

use anyhow::{bail, Result};

use template_search_core::models::{format_ts_iso, tags_text};
use template_search_core::store::{TemplateFilter, TemplateStore};
use template_search_core::{Template, TemplateType};

use crate::config::Config;
use crate::db;
use crate::sqlite_store::SqliteStore;

pub async fn run_get(config: &Config, id: i64, json: bool) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let template = store.get_template(id).await?;
    store.pool().close().await;

    let Some(t) = template else {
        bail!("template not found: {}", id);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&t)?);
        return Ok(());
    }

    print_template(&t);
    Ok(())
}

pub async fn run_list(config: &Config, template_type: Option<TemplateType>, json: bool) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let templates = store
        .list_templates(TemplateFilter::by_type(template_type), i64::MAX)
        .await?;
    store.pool().close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&templates)?);
        return Ok(());
    }

    if templates.is_empty() {
        println!("No templates.");
        return Ok(());
    }

    for t in &templates {
        let marker = if t.embedding.is_some() { ' ' } else { '*' };
        println!("{:>5}{} [{}] {}", t.id, marker, t.template_type, t.title);
    }
    println!();
    println!("{} templates (* = no embedding)", templates.len());
    Ok(())
}

fn print_template(t: &Template) {
    println!("--- Template ---");
    println!("id:            {}", t.id);
    println!("title:         {}", t.title);
    println!("type:          {}", t.template_type);
    println!("best use case: {}", t.best_use_case);
    println!("github:        {}", t.github_url);
    println!("libraries:     {}", tags_text(&t.library_tags));
    println!("architecture:  {}", tags_text(&t.architecture_tags));
    println!("embedded:      {}", if t.embedding.is_some() { "yes" } else { "no" });
    println!("created_at:    {}", format_ts_iso(t.created_at));
    println!("updated_at:    {}", format_ts_iso(t.updated_at));
    println!();
    println!("--- Description ---");
    println!("{}", t.description);
    if let Some(notes) = &t.notes {
        println!();
        println!("--- Notes ---");
        println!("{}", notes);
    }
}
