use std::fmt::Write as _;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use quire_content::{
    AdapterContentTypes, ContentEntryRepository, Criteria, Entity, IdentityMap, RepositoryConfig,
    ScopedRepository,
};
use quire_store::{FilesystemAdapter, StorageAdapter};
use quire_types::{json, Locale, Value};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let repository = open(&cli)?;
    let output = match &cli.command {
        Command::Types => render_types(&repository, cli.format)?,
        Command::Entries(args) => render_entries(&repository, args, cli.format)?,
        Command::Show(args) => render_show(&repository, args, cli.format)?,
        Command::Group(args) => render_group(&repository, args, cli.format)?,
    };
    print!("{output}");
    Ok(())
}

fn open(cli: &Cli) -> anyhow::Result<ContentEntryRepository> {
    let config = match &cli.config {
        Some(path) => RepositoryConfig::load(path)?,
        None => {
            let default = cli.root.join("quire.toml");
            if default.is_file() {
                RepositoryConfig::load(&default)?
            } else {
                RepositoryConfig::default()
            }
        }
    };

    let adapter: Arc<dyn StorageAdapter> = Arc::new(FilesystemAdapter::new(&cli.root));
    let content_types =
        AdapterContentTypes::new(Arc::clone(&adapter), config.content_types_collection.clone())
            .for_site(config.site.site_id.clone());
    let repository = ContentEntryRepository::from_config(
        adapter,
        Arc::new(content_types),
        &config,
        cli.locale.clone().map(Locale::from),
    )?;
    debug!(root = %cli.root.display(), locale = %repository.locale(), "content repository opened");
    Ok(repository)
}

fn scoped(repository: &ContentEntryRepository, slug: &str) -> anyhow::Result<ScopedRepository> {
    repository
        .with_slug(slug)?
        .with_context(|| format!("unknown content type `{slug}`"))
}

/// A condition value given on the command line: JSON when it parses, text
/// otherwise.
fn condition_value(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

fn pretty(value: &Value) -> anyhow::Result<String> {
    Ok(format!("{}\n", serde_json::to_string_pretty(value)?))
}

fn summary(entry: &Entity, locale: &Locale) -> Value {
    json!({
        "_id": entry.id().map(|id| id.to_value()),
        "_slug": entry.slug(locale),
        "_label": entry.label(locale),
        "_visible": entry.is_visible(),
    })
}

fn entry_line(entry: &Entity, locale: &Locale) -> String {
    let slug = entry.slug(locale).unwrap_or("-");
    let label = entry.label(locale).unwrap_or("(untitled)");
    let hidden = if entry.is_visible() { "".normal() } else { " hidden".dimmed() };
    format!("{}  {}{}", slug.yellow(), label, hidden)
}

// ---------------------------------------------------------------------------
// types
// ---------------------------------------------------------------------------

fn render_types(
    repository: &ContentEntryRepository,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let types = repository.content_types().all()?;
    if format == OutputFormat::Json {
        let values = types
            .iter()
            .map(|t| serde_json::to_value(t.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        return pretty(&Value::Array(values));
    }

    let mut out = String::new();
    if types.is_empty() {
        writeln!(out, "No content types.")?;
    }
    for content_type in &types {
        writeln!(
            out,
            "{}  {}  {}  ({} fields)",
            content_type.id.to_string().cyan(),
            content_type.slug.yellow().bold(),
            content_type.name,
            content_type.fields.len()
        )?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// entries
// ---------------------------------------------------------------------------

fn render_entries(
    repository: &ContentEntryRepository,
    args: &EntriesArgs,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let scoped = scoped(repository, &args.content_type)?;
    let mut criteria: Criteria = args
        .conditions
        .iter()
        .map(|(key, value)| (key.clone(), condition_value(value)))
        .collect();
    if args.all {
        criteria.insert("_visible", Value::Null);
    }

    let identity = IdentityMap::new();
    let entries = scoped.all(&identity, criteria)?;
    let locale = repository.locale();

    if format == OutputFormat::Json {
        let values = entries.iter().map(|e| scoped.serialize(e).into_value()).collect();
        return pretty(&Value::Array(values));
    }

    let mut out = String::new();
    if entries.is_empty() {
        writeln!(out, "No entries.")?;
    }
    for entry in &entries {
        writeln!(out, "{}", entry_line(entry, locale))?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// show
// ---------------------------------------------------------------------------

fn render_show(
    repository: &ContentEntryRepository,
    args: &ShowArgs,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let scoped = scoped(repository, &args.content_type)?;
    let identity = IdentityMap::new();
    let locale = repository.locale();
    let entry = scoped
        .by_slug(&identity, Some(&args.slug))?
        .with_context(|| {
            format!("no visible `{}` entry with slug `{}`", args.content_type, args.slug)
        })?;

    let record = scoped.serialize(&entry);
    let mut related = serde_json::Map::new();
    for association in entry.associations() {
        let targets = association.resolve(&identity)?.into_vec();
        let summaries = targets.iter().map(|t| summary(t, locale)).collect();
        related.insert(association.name().to_string(), Value::Array(summaries));
    }
    let previous = repository.previous(&identity, Some(&*entry))?;
    let next = repository.next(&identity, Some(&*entry))?;

    if format == OutputFormat::Json {
        return pretty(&json!({
            "entry": record.into_value(),
            "url": entry.url(locale),
            "associations": related,
            "previous": previous.map(|e| summary(&e, locale)),
            "next": next.map(|e| summary(&e, locale)),
        }));
    }

    let mut out = String::new();
    writeln!(out, "{}", entry.label(locale).unwrap_or("(untitled)").bold())?;
    if let Some(url) = entry.url(locale) {
        writeln!(out, "  {}", url.blue())?;
    }
    for (key, value) in record.iter() {
        writeln!(out, "  {}: {}", key.cyan(), value)?;
    }
    for (name, targets) in &related {
        let labels: Vec<String> = targets
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(|t| t.get("_label").and_then(Value::as_str).map(str::to_string))
            .collect();
        writeln!(out, "  {} {}", format!("{name} →").green(), labels.join(", "))?;
    }
    if let Some(previous) = previous {
        writeln!(out, "  previous: {}", entry_line(&previous, locale))?;
    }
    if let Some(next) = next {
        writeln!(out, "  next: {}", entry_line(&next, locale))?;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// group
// ---------------------------------------------------------------------------

fn render_group(
    repository: &ContentEntryRepository,
    args: &GroupArgs,
    format: OutputFormat,
) -> anyhow::Result<String> {
    let scoped = scoped(repository, &args.content_type)?;
    let identity = IdentityMap::new();
    let locale = repository.locale();
    let groups = scoped.group_by_select_option(&identity, &args.field)?;

    if format == OutputFormat::Json {
        let values = groups
            .iter()
            .map(|group| {
                json!({
                    "option_id": group.option_id.as_ref().map(|id| id.to_value()),
                    "name": group.name,
                    "entries": group.entries.iter().map(|e| summary(e, locale)).collect::<Vec<_>>(),
                })
            })
            .collect();
        return pretty(&Value::Array(values));
    }

    let mut out = String::new();
    if groups.is_empty() {
        writeln!(out, "`{}` is not a select field of `{}`.", args.field, args.content_type)?;
    }
    for group in &groups {
        let name = group.name.as_deref().unwrap_or("(no option)");
        writeln!(out, "{} ({})", name.bold(), group.entries.len())?;
        for entry in &group.entries {
            writeln!(out, "  {}", entry_line(entry, locale))?;
        }
    }
    Ok(out)
}
