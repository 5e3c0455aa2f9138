use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use colored::Colorize;
use eyre::{Result, bail};
use std::path::PathBuf;
use todo_client::{
    Category, ClientConfig, ExportFormat, MemoryTokenStorage, Navigation, NewTask, Priority, SortKey, Tag, Task,
    TaskPatch, TaskQuery, TodoClient, suggested_filename,
};
use tracing::Level;

#[derive(Parser)]
#[command(name = "todo")]
#[command(about = "Command-line client for the todo backend")]
#[command(version)]
struct Cli {
    /// Path to the config file (default: ~/.config/todo-client/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Backend base URL, overriding config and TODO_API_BASE
    #[arg(long, global = true)]
    api_base: Option<String>,

    /// Keep tokens in memory only; nothing is persisted
    #[arg(long, global = true)]
    ephemeral: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and store credentials
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TODO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Create an account and sign in
    Register {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TODO_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget stored credentials
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List todos
    List {
        /// Fuzzy search over title, description, category and tags
        #[arg(short, long)]
        search: Option<String>,

        /// Only these priorities (repeatable)
        #[arg(short, long)]
        priority: Vec<Priority>,

        /// Sort by due, created or priority
        #[arg(long)]
        sort: Option<SortKey>,

        #[arg(long, conflicts_with = "completed")]
        pending: bool,

        #[arg(long)]
        completed: bool,
    },

    /// Create a todo
    Add {
        title: String,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        /// Due date (YYYY-MM-DD)
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        category: Option<i64>,
    },

    /// Change fields of a todo
    Edit {
        id: i64,
        #[arg(long)]
        title: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        priority: Option<Priority>,
        #[arg(long)]
        due: Option<NaiveDate>,
    },

    /// Toggle a todo between done and pending
    Done { id: i64 },

    /// Delete a todo
    Rm { id: i64 },

    /// Export todos to CSV or flashcards
    Export {
        #[arg(short, long, default_value = "csv")]
        format: ExportFormat,
        /// Destination file (default: todos_<date>.csv / anki_<date>.tsv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Manage categories
    #[command(subcommand)]
    Categories(CategoryCommand),

    /// Manage tags
    #[command(subcommand)]
    Tags(TagCommand),
}

#[derive(Subcommand)]
enum CategoryCommand {
    List,
    Add {
        name: String,
        #[arg(long, default_value = "#ffffff")]
        color: String,
    },
    Rm {
        id: i64,
        /// Move the category's todos here instead of leaving them uncategorized
        #[arg(long)]
        reassign_to: Option<i64>,
    },
}

#[derive(Subcommand)]
enum TagCommand {
    List,
    Add { name: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .init();

    let mut config = ClientConfig::load(cli.config.as_deref())?;
    if let Some(api_base) = cli.api_base.clone() {
        config.api_base = api_base;
    }

    let client = if cli.ephemeral {
        TodoClient::with_storage(&config, Box::new(MemoryTokenStorage::new()))
    } else {
        TodoClient::from_config(&config)?
    };

    run(&client, cli.command).await
}

async fn run(client: &TodoClient, command: Commands) -> Result<()> {
    let session = client.session();

    match command {
        Commands::Login { email, password } => {
            let user = session.login(&email, &password).await?;
            println!("{} Logged in as {}", "✓".green().bold(), user.email);
            return Ok(());
        }
        Commands::Register { email, password } => {
            let user = session.register(&email, &password).await?;
            println!("{} Registered and logged in as {}", "✓".green().bold(), user.email);
            return Ok(());
        }
        Commands::Logout => {
            session.logout();
            println!("Logged out");
            return Ok(());
        }
        _ => {}
    }

    if session.guard().await == Navigation::Proceed {
        dispatch(client, command).await
    } else {
        bail!("Not logged in. Run `todo login --email <EMAIL>` first.")
    }
}

async fn dispatch(client: &TodoClient, command: Commands) -> Result<()> {
    let tasks = client.tasks();

    match command {
        Commands::Whoami => match client.session().user() {
            Some(user) => println!("{} (id {})", user.email, user.id),
            None => bail!("No user loaded"),
        },
        Commands::List {
            search,
            priority,
            sort,
            pending,
            completed,
        } => {
            tasks.fetch_all().await?;
            let mut params = TaskQuery::new().priorities(priority);
            if let Some(text) = search {
                params = params.text(text);
            }
            if let Some(key) = sort {
                params = params.sort(key);
            }

            let shown: Vec<Task> = tasks
                .query(&params)
                .into_iter()
                .filter(|t| !(pending && t.completed) && !(completed && !t.completed))
                .collect();
            if shown.is_empty() {
                println!("{}", "No todos".dimmed());
            }
            for task in &shown {
                print_task(task);
            }
        }
        Commands::Add {
            title,
            description,
            priority,
            due,
            category,
        } => {
            let mut new_task = NewTask::new(title);
            if let Some(description) = description {
                new_task = new_task.description(description);
            }
            if let Some(priority) = priority {
                new_task = new_task.priority(priority);
            }
            if let Some(due) = due {
                new_task = new_task.due(due);
            }
            if let Some(category) = category {
                new_task = new_task.category(category);
            }
            let task = tasks.create_task(&new_task).await?;
            println!("{} Created #{}", "✓".green().bold(), task.id);
        }
        Commands::Edit {
            id,
            title,
            description,
            priority,
            due,
        } => {
            let patch = TaskPatch {
                title,
                description,
                priority,
                due_date: due,
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                bail!("Nothing to change");
            }
            let task = tasks.update_task(id, &patch).await?;
            print_task(&task);
        }
        Commands::Done { id } => {
            tasks.fetch_all().await?;
            let task = tasks.toggle_complete(id).await?;
            print_task(&task);
        }
        Commands::Rm { id } => {
            let task = tasks.delete(id).await?;
            println!("{} Deleted #{} {}", "✓".green().bold(), task.id, task.title);
        }
        Commands::Export { format, output } => {
            tasks.fetch_all().await?;
            let all = tasks.snapshot();
            if all.is_empty() {
                println!("{}", "No todos to export".dimmed());
                return Ok(());
            }
            let path =
                output.unwrap_or_else(|| PathBuf::from(suggested_filename(format, Local::now().date_naive())));
            std::fs::write(&path, format.render(&all))?;
            println!("{} Exported {} todos to {}", "✓".green().bold(), all.len(), path.display());
        }
        Commands::Categories(command) => categories(client, command).await?,
        Commands::Tags(command) => tags(client, command).await?,
        Commands::Login { .. } | Commands::Register { .. } | Commands::Logout => {}
    }

    Ok(())
}

async fn categories(client: &TodoClient, command: CategoryCommand) -> Result<()> {
    let store = client.categories();
    match command {
        CategoryCommand::List => {
            store.fetch_all().await?;
            for category in store.snapshot() {
                print_category(&category);
            }
        }
        CategoryCommand::Add { name, color } => {
            let category = store.create_category(&name, &color).await?;
            print_category(&category);
        }
        CategoryCommand::Rm { id, reassign_to } => {
            let category = store.delete_category(id, reassign_to).await?;
            println!("{} Deleted category {}", "✓".green().bold(), category.name);
        }
    }
    Ok(())
}

async fn tags(client: &TodoClient, command: TagCommand) -> Result<()> {
    let store = client.tags();
    match command {
        TagCommand::List => {
            store.fetch_all().await?;
            for tag in store.snapshot() {
                print_tag(&tag);
            }
        }
        TagCommand::Add { name } => {
            let tag = store.create_tag(&name).await?;
            print_tag(&tag);
        }
    }
    Ok(())
}

fn print_task(task: &Task) {
    let mark = if task.completed { "[x]".green() } else { "[ ]".normal() };
    let priority = match task.priority {
        Some(Priority::P1) => "P1".red().bold(),
        Some(Priority::P2) => "P2".yellow(),
        Some(Priority::P3) => "P3".normal(),
        None => "--".dimmed(),
    };
    let mut line = format!("{} {:>4} {} {}", mark, format!("#{}", task.id).dimmed(), priority, task.title);
    if let Some(due) = task.due_date {
        line.push_str(&format!(" {}", format!("due {}", due).cyan()));
    }
    if let Some(category) = &task.category {
        line.push_str(&format!(" {}", format!("@{}", category.name).blue()));
    }
    for tag in &task.tags {
        line.push_str(&format!(" {}", format!("#{}", tag.name).magenta()));
    }
    println!("{}", line);
}

fn print_category(category: &Category) {
    let count = category.todo_count.map(|n| format!(" ({} todos)", n)).unwrap_or_default();
    println!("{:>4} {} {}{}", category.id, category.name, category.color.dimmed(), count);
}

fn print_tag(tag: &Tag) {
    println!("{:>4} {}", tag.id, tag.name);
}
