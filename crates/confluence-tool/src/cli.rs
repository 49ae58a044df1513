//! Command line interface for ct

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

use confluence_tool::output::{self, Format};
use confluence_tool::page::BODY_VIEW;
use confluence_tool::{
    ApiClient, Config, ConfigError, ConnectionArgs, ContentApi, Expand, ExtractOptions, Page,
};
use secrets::SecretStore;

const CONFIG_MISSING_HINT: &str =
    "Config file missing. Please run 'ct config' or specify --baseurl";

#[derive(Parser)]
#[command(name = "ct")]
#[command(about = "Confluence API and CLI - pages, labels and page properties")]
#[command(version)]
#[command(after_help = r#"CONNECTION:
    Settings are merged field by field, first match wins:
    1. --baseurl / --username / --password
    2. the profile named by --config (default: "default") in ~/.confluence-tool.yaml
    3. the secrets vault, for the password of that user at that URL

    Save a profile with:
        ct --baseurl https://wiki.example.com --username me config"#)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionOpts,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Default)]
pub struct ConnectionOpts {
    /// Base URL of the Confluence server
    #[arg(long, global = true)]
    pub baseurl: Option<String>,

    /// User to log in as
    #[arg(short, long, global = true)]
    pub username: Option<String>,

    /// Password (looked up in the secrets vault if omitted)
    #[arg(long, global = true)]
    pub password: Option<String>,

    /// Profile name in the config file
    #[arg(short = 'c', long = "config", global = true, value_name = "NAME")]
    pub profile: Option<String>,

    /// Use this config file instead of ~/.confluence-tool.yaml
    #[arg(long, global = true, value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    /// Show full error details and debug logs
    #[arg(long, global = true)]
    pub debug: bool,
}

impl From<ConnectionOpts> for ConnectionArgs {
    fn from(opts: ConnectionOpts) -> Self {
        ConnectionArgs {
            baseurl: opts.baseurl,
            username: opts.username,
            password: opts.password,
            profile: opts.profile,
            config_file: opts.config_file,
            debug: opts.debug,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save --baseurl and --username as a profile (password goes to the vault)
    Config {
        /// List saved profiles instead
        #[arg(long)]
        list: bool,
    },

    /// Show pages by id or CQL query
    Show {
        /// Page ids
        #[arg(required_unless_present = "cql")]
        ids: Vec<String>,

        /// Find pages with a CQL query instead of ids
        #[arg(long, conflicts_with = "ids")]
        cql: Option<String>,

        /// Maximum number of CQL results
        #[arg(long, default_value = "25")]
        limit: usize,

        /// Expansions to request (comma-separated, e.g. body.storage,version)
        #[arg(short, long, default_value = "")]
        expand: String,

        /// Only show these fields (repeatable; pageProperties, labels and spacekey included)
        #[arg(short, long = "field")]
        fields: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show page properties
    PageProp {
        /// Page ids
        #[arg(required = true)]
        ids: Vec<String>,

        /// Only show these properties (repeatable)
        #[arg(short, long = "prop")]
        props: Vec<String>,

        /// Keep the HTML markup of property values
        #[arg(long)]
        html: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show page labels
    Labels {
        /// Page ids
        #[arg(required = true)]
        ids: Vec<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Dispatch a command against the resolved configuration
pub fn run<S: SecretStore>(config: &mut Config<S>, command: Commands) -> Result<()> {
    match command {
        Commands::Config { list } => cmd_config(config, list),
        Commands::Show {
            ids,
            cql,
            limit,
            expand,
            fields,
            json,
        } => cmd_show(config, &ids, cql.as_deref(), limit, &expand, &fields, json),
        Commands::PageProp {
            ids,
            props,
            html,
            json,
        } => cmd_page_prop(config, &ids, &props, html, json),
        Commands::Labels { ids, json } => cmd_labels(config, &ids, json),
    }
}

/// One line for the user, or the whole error chain with `--debug`
pub fn error_report(err: &anyhow::Error, debug: bool) -> String {
    if debug {
        return format!("error: {:?}", err);
    }

    match err.downcast_ref::<ConfigError>() {
        Some(ConfigError::Missing { .. }) => CONFIG_MISSING_HINT.to_string(),
        _ => format!("error: {}", err),
    }
}

/// Save or list profiles
fn cmd_config<S: SecretStore>(config: &mut Config<S>, list: bool) -> Result<()> {
    if list {
        let current = config.profile_name().to_string();
        for name in config.profiles()? {
            let marker = if name == current { "*" } else { " " };
            println!("{} {}", marker, name);
        }
        return Ok(());
    }

    let path = config.save_profile(|| {
        eprintln!("Password will be stored in the confluence-tool secrets vault.");
        rpassword::prompt_password("Password: ").context("Failed to read password")
    })?;

    println!(
        "success: Profile '{}' saved to {}",
        config.profile_name(),
        path.display()
    );
    Ok(())
}

fn cmd_show<S: SecretStore>(
    config: &mut Config<S>,
    ids: &[String],
    cql: Option<&str>,
    limit: usize,
    expand: &str,
    fields: &[String],
    json: bool,
) -> Result<()> {
    let client = config.connect()?;
    let expand = Expand::parse(expand);

    let records = match cql {
        Some(query) => client.search(query, &expand, limit)?,
        None => ids
            .iter()
            .map(|id| client.get_page(id, &expand))
            .collect::<Result<Vec<_>>>()?,
    };

    let fields: Vec<&str> = fields.iter().map(String::as_str).collect();
    let mut documents = Vec::with_capacity(records.len());
    for record in records {
        let mut page = Page::new(&client, record, expand.clone());
        documents.push(page.to_mapping(&fields)?);
    }

    output::print(&documents, Format::from_json_flag(json))
}

fn cmd_page_prop<S: SecretStore>(
    config: &mut Config<S>,
    ids: &[String],
    props: &[String],
    html: bool,
    json: bool,
) -> Result<()> {
    let client = config.connect()?;
    let options = ExtractOptions {
        html,
        properties: None,
    };

    let documents = page_properties_documents(&client, ids, props, &options)?;
    output::print(&documents, Format::from_json_flag(json))
}

/// One `{id, title, pageProperties}` document per page, each fetched once
/// with the rendered view already expanded
fn page_properties_documents<C: ContentApi + ?Sized>(
    api: &C,
    ids: &[String],
    props: &[String],
    options: &ExtractOptions,
) -> Result<Vec<Value>> {
    let mut documents = Vec::with_capacity(ids.len());
    for id in ids {
        let mut page =
            Page::fetch(api, id, Expand::parse(BODY_VIEW))?.with_extract_options(options.clone());
        documents.push(page_properties_document(&mut page, props)?);
    }
    Ok(documents)
}

fn page_properties_document<C: ContentApi + ?Sized>(
    page: &mut Page<'_, C>,
    props: &[String],
) -> Result<Value> {
    let mut document = Map::new();
    document.insert("id".to_string(), Value::String(page.id()?));
    document.insert(
        "title".to_string(),
        page.get("title").unwrap_or(Value::Null),
    );

    let properties: Map<String, Value> = page
        .page_properties_filtered(props)?
        .map(|(key, value)| (key.to_string(), value.clone()))
        .collect();
    document.insert("pageProperties".to_string(), Value::Object(properties));

    Ok(Value::Object(document))
}

fn cmd_labels<S: SecretStore>(config: &mut Config<S>, ids: &[String], json: bool) -> Result<()> {
    let client: ApiClient = config.connect()?;

    let mut documents = Vec::with_capacity(ids.len());
    for id in ids {
        // Labels only need the id, so the page itself is not fetched
        let mut page = Page::new(&client, page_stub(id), Expand::new());
        documents.push(page.to_mapping(&["id", "labels"])?);
    }

    output::print(&documents, Format::from_json_flag(json))
}

fn page_stub(id: &str) -> Value {
    let mut map = Map::new();
    map.insert("id".to_string(), Value::String(id.to_string()));
    Value::Object(map)
}
