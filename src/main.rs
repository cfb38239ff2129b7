use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Local;
use clap::{Parser, Subcommand};
use log::{error, LevelFilter};
use serde::Serialize;

use foi_portal::debug::FileDumpSink;
use foi_portal::{
    config, info_time, Draft, DraftRequest, Interface, PortalClient, RequestPage, Result,
    SentRequest, DEFAULT_DOMAIN,
};

const REQUEST_BODY_TEMPLATE: &str = "Dear Sir or Madam,

Referring to Regulation (EC) No 1049/2001 on public access to EU documents and to the 'Aarhus Convention' I would herewith like to ask for access to the following documents:

All documents related to [SUBJECT].

In consideration of the environment I would prefer to receive documents electronically.

Should my request be denied wholly or partially, please explain the denial or all deletions referring to specific exemptions in the regulation.

Please confirm having received this application. I look forward to your reply within 15 business days, according to the regulation.

Yours sincerely,
[YOUR NAME]
";

/// File and track freedom-of-information requests on AskTheEU.org.
///
/// Without a subcommand, `<PUBLIC_BODY_ID> <TITLE>` creates a draft from the
/// standard request template.
#[derive(Parser)]
#[command(author, version, about, args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Id of the receiving public body on the portal
    public_body_id: Option<String>,
    /// Title of the request
    title: Option<String>,

    /// Portal base URL
    #[arg(long, global = true, default_value = DEFAULT_DOMAIN)]
    domain: String,
    /// Save the raw HTML of every fetched page into this directory
    #[arg(long, global = true)]
    debug_dir: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Log every request made
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Check that the configured credentials can sign in
    Login,
    /// Create a draft request
    Draft {
        public_body_id: String,
        title: String,
        /// Read the request body from a file instead of the template
        #[arg(long)]
        body_file: Option<PathBuf>,
        /// Embargo duration for Pro accounts, e.g. `3_months`
        #[arg(long)]
        embargo: Option<String>,
    },
    /// Send a previously created draft
    Send {
        draft_id: String,
        /// The draft was created through the standard interface
        #[arg(long)]
        standard: bool,
    },
    /// List your requests
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(1);
        }
        Err(e) => e.exit(),
    };

    if let Err(e) = init_logger(cli.verbose) {
        eprintln!("Couldn't set up logging: {e}");
    }
    config::load_dotenv();

    let start_time = Local::now();
    let outcome = run(cli).await;
    info_time!(start_time, "Full program time:");

    match outcome {
        Ok(code) => code,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let command = match cli.command {
        Some(command) => command,
        None => match (cli.public_body_id, cli.title) {
            (Some(public_body_id), Some(title)) => Command::Draft {
                public_body_id,
                title,
                body_file: None,
                embargo: None,
            },
            _ => {
                eprintln!("Usage: foi-portal <public_body_id> <request_title>");
                return Ok(ExitCode::from(1));
            }
        },
    };

    let mut builder = PortalClient::builder().domain(cli.domain);
    if let Some(dir) = cli.debug_dir {
        builder = builder.debug_sink(FileDumpSink::new(dir));
    }
    let mut client = builder.build()?;

    if !client.login().await? {
        println!("Login failed. Check your credentials in the .env file.");
        return Ok(ExitCode::from(1));
    }

    match command {
        Command::Login => println!("Login successful"),
        Command::Draft {
            public_body_id,
            title,
            body_file,
            embargo,
        } => {
            let body = match body_file {
                Some(path) => tokio::fs::read_to_string(path).await?,
                None => REQUEST_BODY_TEMPLATE.replace("[SUBJECT]", &title),
            };
            let mut request = DraftRequest::new(public_body_id, title, body);
            if let Some(embargo) = embargo {
                request = request.with_embargo(embargo);
            }
            let draft = client.create_draft_request(&request).await?;
            print_draft(&draft, cli.json)?;
        }
        Command::Send { draft_id, standard } => {
            let interface = if standard {
                Interface::Standard
            } else {
                Interface::Pro
            };
            let sent = client.send_request(&draft_id, interface).await?;
            print_sent(&sent, cli.json)?;
        }
        Command::List { page } => {
            let listing = client.list_requests(page).await?;
            print_listing(&listing, cli.json)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(std::io::Error::from)?;
    println!("{}", json);
    Ok(())
}

fn print_draft(draft: &Draft, json: bool) -> Result<()> {
    if json {
        return print_json(draft);
    }
    println!("Draft created ({} interface): {}", draft.interface, draft.url);
    println!("Draft id: {}", draft.id);
    Ok(())
}

fn print_sent(sent: &SentRequest, json: bool) -> Result<()> {
    if json {
        return print_json(sent);
    }
    match &sent.request_url {
        Some(url) => println!("Request sent: {}", url),
        None => println!("Request sent, but its public URL couldn't be determined"),
    }
    Ok(())
}

fn print_listing(listing: &RequestPage, json: bool) -> Result<()> {
    if json {
        return print_json(listing);
    }
    println!("Found {} requests:", listing.requests.len());
    for (i, request) in listing.requests.iter().enumerate() {
        println!("\n{}. {}", i + 1, request.title);
        println!("   Status: {}", request.status);
        println!("   Date: {}", request.date.as_deref().unwrap_or("-"));
        println!("   URL: {}", request.url.as_deref().unwrap_or("-"));
    }

    let pagination = listing.pagination;
    println!("\nPage: {}", pagination.current_page);
    if let Some(next) = pagination.next_page {
        println!("There are more requests on page {}", next);
    }
    Ok(())
}

fn init_logger(verbose: bool) -> std::result::Result<(), log::SetLoggerError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                message
            ))
        })
        .level(level)
        .level_for("reqwest", LevelFilter::Warn)
        .level_for("html5ever", LevelFilter::Warn)
        .level_for("selectors", LevelFilter::Warn)
        .chain(std::io::stderr())
        .apply()
}
