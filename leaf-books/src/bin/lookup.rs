use anyhow::Context;
use clap::Parser;
use clap::Subcommand;
use leaf_books::Book;
use leaf_books::BookClient;
use leaf_books::BooksConfig;
use leaf_books::books_queue;
use leaf_queue::QueueConfig;
use tracing_subscriber::EnvFilter;

/// Look up books through leafnode's rate limited request queue.
///
/// Upstream and queue settings come from the `LEAFNODE_BOOKS_*` and
/// `LEAFNODE_QUEUE_*` environment variables.
#[derive(Parser, Debug)]
#[command(name = "leafnode-lookup", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// API key for the books upstream
    #[arg(long, env = "LEAFNODE_BOOKS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Free-text search
    Search { query: Vec<String> },
    /// Books by an author
    Author { name: Vec<String> },
    /// A single book by ISBN-10 or ISBN-13
    Isbn { isbn: String },
    /// Books filed under a subject, e.g. "science fiction"
    Subject { subject: Vec<String> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = BooksConfig::from_env();
    if let Some(key) = args.api_key {
        config = config.with_api_key(key);
    }
    let queue = books_queue(QueueConfig::from_env());
    let client = BookClient::new(config, queue).context("building the books client")?;

    let books = match &args.command {
        Command::Search { query } => client.search(&query.join(" ")).await?,
        Command::Author { name } => client.by_author(&name.join(" ")).await?,
        Command::Subject { subject } => client.by_subject(&subject.join(" ")).await?,
        Command::Isbn { isbn } => client
            .by_isbn(isbn)
            .await?
            .into_iter()
            .collect(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&books)?);
    } else if books.is_empty() {
        eprintln!("no books found");
    } else {
        for book in &books {
            println!("{}", summary(book));
        }
    }

    Ok(())
}

fn summary(book: &Book) -> String {
    let mut line = book.title.clone();
    if !book.authors.is_empty() {
        line.push_str(" by ");
        line.push_str(&book.authors.join(", "));
    }
    if let Some(year) = book.published_year() {
        line.push_str(&format!(" ({year})"));
    }
    if let Some(isbn) = book.isbn_13.as_ref().or(book.isbn_10.as_ref()) {
        line.push_str(&format!(" [{isbn}]"));
    }
    line
}
