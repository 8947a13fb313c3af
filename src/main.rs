use clap::{Args, Parser, Subcommand};
use recruiter_client::config::Config;
use recruiter_client::models::{ExportFormat, Lead, LeadDetail, LeadFilter, Query, User};
use recruiter_client::App;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "recruiter", about = "Recruiter AI lead discovery from the command line")]
struct Cli {
    /// Backend root URL.
    #[arg(long, env = "RECRUITER_API_URL")]
    api_url: Option<String>,

    /// Where the session token is kept.
    #[arg(long, env = "RECRUITER_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in (or sign up) with an identity such as an email address.
    Login { identity: String },
    /// Create an account with email and password, then log in.
    Register(RegisterArgs),
    /// Forget the stored session.
    Logout,
    /// Show the logged-in recruiter.
    Whoami,
    /// Change profile fields.
    Profile(ProfileArgs),
    /// Submit a hiring query and follow it until it finishes.
    Run(RunArgs),
    /// Show the current status of a query.
    Status { query_id: String },
    /// List leads.
    Leads(LeadsArgs),
    /// Show one lead with its evidence.
    Lead { lead_id: i64 },
    /// Rate a lead from 1 to 5.
    Feedback(FeedbackArgs),
    /// Download all leads to a file.
    Export(ExportArgs),
    /// Today's numbers and recent activity.
    Dashboard,
    /// Query volume and cost over a period.
    Usage {
        #[arg(long, default_value = "30d")]
        period: String,
    },
    /// Past queries.
    History {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Check that the backend is up.
    Health,
}

#[derive(Args, Debug)]
struct RegisterArgs {
    email: String,
    #[arg(long, env = "RECRUITER_PASSWORD", hide_env_values = true)]
    password: String,
    #[arg(long)]
    name: String,
    #[arg(long)]
    company: Option<String>,
}

#[derive(Args, Debug)]
struct ProfileArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    company: Option<String>,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// What you are hiring for, in plain words.
    query: String,
    /// Print the query id and return without waiting.
    #[arg(long)]
    no_wait: bool,
}

#[derive(Args, Debug)]
struct LeadsArgs {
    #[arg(long, default_value_t = 50)]
    limit: u32,
    #[arg(long, default_value_t = 0)]
    offset: u32,
    /// Hide leads scoring below this.
    #[arg(long)]
    min_score: Option<f64>,
    /// Include leads from every recruiter.
    #[arg(long)]
    all: bool,
}

#[derive(Args, Debug)]
struct FeedbackArgs {
    lead_id: i64,
    #[arg(value_parser = clap::value_parser!(u8).range(1..=5))]
    rating: u8,
    #[arg(long)]
    comment: Option<String>,
}

#[derive(Args, Debug)]
struct ExportArgs {
    #[arg(long, default_value = "csv")]
    format: ExportFormat,
    /// Output file; defaults to `leads.<format>`.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so command output stays pipeable
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recruiter_client=info,recruiter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(url) = cli.api_url {
        config = config.with_api_url(url)?;
    }
    if let Some(path) = cli.session_file {
        config.session_file = path;
    }

    let app = App::with_file_storage(config)?;
    app.auth.restore().await;

    match cli.command {
        Command::Login { identity } => {
            let user = app.auth.login(&identity).await?;
            println!("Logged in as {}", describe_user(&user));
        }
        Command::Register(args) => {
            let user = app
                .auth
                .register(
                    &args.email,
                    &args.password,
                    &args.name,
                    args.company.as_deref(),
                )
                .await?;
            println!("Registered and logged in as {}", describe_user(&user));
        }
        Command::Logout => {
            app.auth.logout().await;
            println!("Logged out");
        }
        Command::Whoami => match app.auth.check_session().await {
            Some(user) => println!("{}", describe_user(&user)),
            None => println!("Not logged in"),
        },
        Command::Profile(args) => {
            let user = app
                .auth
                .update_profile(args.name.as_deref(), args.company.as_deref())
                .await?;
            println!("Profile updated: {}", describe_user(&user));
        }
        Command::Run(args) => run_query(&app, &args).await?,
        Command::Status { query_id } => {
            let query = app.leads.refresh_query(&query_id).await?;
            print_query(&query);
        }
        Command::Leads(args) => {
            let recruiter_id = if args.all {
                None
            } else {
                app.auth.recruiter_id().await
            };
            let filter = LeadFilter {
                recruiter_id,
                limit: args.limit,
                offset: args.offset,
                min_score: args.min_score,
            };
            let leads = app.leads.fetch_leads(&filter).await?;
            if leads.is_empty() {
                println!("No leads yet. Try `recruiter run \"...\"`.");
            }
            for lead in &leads {
                print_lead(lead);
            }
        }
        Command::Lead { lead_id } => {
            let detail = app.leads.get_lead(lead_id).await?;
            print_lead_detail(&detail);
        }
        Command::Feedback(args) => {
            let recruiter_id = app.auth.recruiter_id().await;
            // Load the recruiter's leads so the rating lands on a known record
            let filter = LeadFilter {
                recruiter_id,
                ..LeadFilter::default()
            };
            if let Err(e) = app.leads.fetch_leads(&filter).await {
                tracing::warn!("Could not preload leads: {}", e);
            }
            let ack = app
                .leads
                .submit_feedback(args.lead_id, args.rating, args.comment.as_deref())
                .await?;
            println!(
                "{}",
                ack.message
                    .unwrap_or_else(|| format!("Feedback {}", ack.status))
            );
        }
        Command::Export(args) => {
            let recruiter_id = app.auth.recruiter_id().await;
            let blob = app
                .leads
                .export_leads(args.format, recruiter_id.as_deref())
                .await?;
            let output = args
                .output
                .unwrap_or_else(|| PathBuf::from(format!("leads.{}", args.format.extension())));
            tokio::fs::write(&output, &blob).await?;
            println!("Wrote {} bytes to {}", blob.len(), output.display());
        }
        Command::Dashboard => {
            let recruiter_id = app.auth.recruiter_id().await;
            let metrics = app.leads.dashboard_metrics(recruiter_id.as_deref()).await?;
            println!("Leads today:   {}", metrics.today_leads);
            println!("Leads total:   {}", metrics.total_leads);
            println!("Average score: {:.1}", metrics.average_score);
            if !metrics.recent_queries.is_empty() {
                println!("\nRecent queries:");
                for q in &metrics.recent_queries {
                    println!("  [{:>10}] {}  {}", q.status, q.id, q.query_text);
                }
            }
            if !metrics.top_companies.is_empty() {
                println!("\nTop companies:");
                for c in &metrics.top_companies {
                    println!("  {:<30} {}", c.company, c.leads);
                }
            }
            if let Some(id) = recruiter_id {
                match app.leads.recruiter_stats(&id).await {
                    Ok(stats) => println!(
                        "\nYour queries: {}  leads: {}  leads/query: {:.1}",
                        stats.total_queries, stats.total_leads, stats.leads_per_query
                    ),
                    Err(e) => tracing::warn!("Recruiter stats unavailable: {}", e),
                }
            }
            match app.leads.performance_metrics().await {
                Ok(perf) => {
                    println!("\nPlatform performance:");
                    println!(
                        "  {} queries, {:.1}% successful, {:.1}s average",
                        perf.total_queries, perf.query_success_rate, perf.average_execution_time
                    );
                    println!(
                        "  {} leads, {:.1} per query, average score {:.1}",
                        perf.total_leads, perf.average_leads_per_query, perf.average_lead_score
                    );
                }
                Err(e) => tracing::warn!("Performance metrics unavailable: {}", e),
            }
        }
        Command::Usage { period } => {
            let recruiter_id = app.auth.recruiter_id().await;
            let usage = app
                .leads
                .usage_metrics(&period, recruiter_id.as_deref())
                .await?;
            println!("Period:       {}", usage.period);
            println!(
                "Queries:      {} ({} successful, {:.1}%)",
                usage.total_queries, usage.successful_queries, usage.success_rate
            );
            println!(
                "Cost:         {:.2} ({:.2} per query)",
                usage.total_cost, usage.average_cost_per_query
            );
        }
        Command::History { limit, offset } => {
            let recruiter_id = app.auth.recruiter_id().await;
            let page = app
                .leads
                .query_history(recruiter_id.as_deref(), limit, offset)
                .await?;
            for entry in &page.queries {
                println!("[{:>10}] {}  {}", entry.status, entry.id, entry.query_text);
            }
            println!("{} shown", page.total);
        }
        Command::Health => {
            let health = app.leads.health().await?;
            println!(
                "Backend {} (version {})",
                health.status,
                health.version.as_deref().unwrap_or("unknown")
            );
            if !health.is_healthy() {
                anyhow::bail!("backend reports status '{}'", health.status);
            }
        }
    }

    Ok(())
}

async fn run_query(app: &App, args: &RunArgs) -> anyhow::Result<()> {
    let recruiter_id = app.auth.recruiter_id().await;
    let submission = app
        .leads
        .submit_query(&args.query, recruiter_id.as_deref())
        .await?;

    let Some(handle) = submission.handle else {
        let query = submission.query;
        print_query(&query);
        return Ok(());
    };

    println!("Query {} is {}", handle.query_id(), submission.query.status);
    if args.no_wait {
        println!("Check on it with `recruiter status {}`", handle.query_id());
        // Dropping the handle stops the poll task.
        return Ok(());
    }

    let mut updates = handle.subscribe();
    let printer = tokio::spawn(async move {
        let mut last = updates.borrow().status;
        while updates.changed().await.is_ok() {
            let status = updates.borrow().status;
            if status != last {
                eprintln!("… {}", status);
                last = status;
            }
        }
    });

    let result = tokio::select! {
        result = app.leads.wait_for_query(handle) => result,
        _ = tokio::signal::ctrl_c() => {
            // The wait future (and with it the handle) is dropped here,
            // which stops polling.
            printer.abort();
            anyhow::bail!("interrupted");
        }
    };
    printer.abort();

    match result {
        Ok(query) => {
            print_query(&query);
            Ok(())
        }
        Err(e) => {
            let message = app
                .leads
                .last_error()
                .await
                .unwrap_or_else(|| e.user_message());
            anyhow::bail!(message)
        }
    }
}

fn describe_user(user: &User) -> String {
    match user.company.as_deref() {
        Some(company) if !company.is_empty() => {
            format!("{} <{}> at {}", user.full_name, user.email, company)
        }
        _ => format!("{} <{}>", user.full_name, user.email),
    }
}

fn print_query(query: &Query) {
    println!("Query {}: {}", query.query_id, query.status);
    if !query.original_query.is_empty() {
        println!("  \"{}\"", query.original_query);
    }
    if let Some(ref error) = query.error {
        println!("  error: {}", error);
    }
    if let Some(ref synthesis) = query.synthesis {
        println!("\n{}\n", synthesis);
    }
    if query.is_terminal() {
        println!(
            "  {} lead(s){}",
            query.leads.len(),
            query
                .processing_time
                .map(|t| format!(" in {:.1}s", t))
                .unwrap_or_default()
        );
    }
    for lead in &query.leads {
        print_lead(lead);
    }
}

fn print_lead(lead: &Lead) {
    let id = lead
        .id
        .map(|id| format!("#{:<5}", id))
        .unwrap_or_else(|| "      ".to_string());
    let mut headline = format!(
        "{} {:<30} score {:>5.1}  confidence {:.2}",
        id,
        lead.company,
        lead.display_score(),
        lead.display_confidence()
    );
    if let Some(ref role) = lead.role {
        headline.push_str(&format!("  {}", role));
    }
    if let Some(ref location) = lead.location {
        headline.push_str(&format!(" ({})", location));
    }
    if let Some(rating) = lead.feedback_rating {
        headline.push_str(&format!("  rated {}/5", rating));
    }
    println!("{}", headline);
    for reason in &lead.reasons {
        println!("         - {}", reason);
    }
}

fn print_lead_detail(detail: &LeadDetail) {
    print_lead(&detail.lead);
    println!("  evidence items: {}", detail.lead.evidence_count);
    if let Some(ref created) = detail.lead.created_at {
        println!("  found: {}", created.format("%Y-%m-%d %H:%M UTC"));
    }
    for (label, value) in [
        ("job postings", &detail.job_postings),
        ("news mentions", &detail.news_mentions),
        ("evidence", &detail.evidence_objects),
    ] {
        if let Some(value) = value {
            let count = value.as_array().map(Vec::len).unwrap_or(1);
            println!("  {}: {}", label, count);
        }
    }
}
