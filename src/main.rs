use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use labstock::{
    auth::Actor,
    config::{self, AppConfig},
    db::{self, DbPool, PageRequest},
    entities::user,
    queries::{item_queries::ItemFilter, movement_queries::MovementFilter},
    services::{
        items::ItemDetails,
        movements::{MovementRequest, MovementView},
        stats::is_expired,
    },
    AppServices,
};
use sea_orm::EntityTrait;
use serde::Serialize;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Init => handle_init(&context).await?,
        Commands::Stats(args) => handle_stats(&context, args, cli.json).await?,
        Commands::LowStock => handle_low_stock(&context, cli.json).await?,
        Commands::Expiring(args) => handle_expiring(&context, args, cli.json).await?,
        Commands::Items(command) => handle_items_command(&context, command, cli.json).await?,
        Commands::Movements(command) => {
            handle_movements_command(&context, command, cli.json).await?
        }
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "labstock", about = "Laboratory stock and movement ledger", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create any missing tables
    Init,
    Stats(StatsArgs),
    /// Items at or below their minimum quantity
    LowStock,
    Expiring(ExpiringArgs),
    #[command(subcommand)]
    Items(ItemsCommands),
    #[command(subcommand)]
    Movements(MovementsCommands),
}

#[derive(Args)]
struct StatsArgs {
    #[arg(long, help = "Show activity of one user instead of the dashboard")]
    user: Option<i32>,
}

#[derive(Args)]
struct ExpiringArgs {
    #[arg(long, help = "Look-ahead window in days (configured default when omitted)")]
    days: Option<i64>,
}

#[derive(Args)]
struct PageArgs {
    #[arg(long, default_value_t = 1)]
    page: i64,
    #[arg(long, default_value_t = 0, help = "Rows per page (0 = configured default)")]
    page_size: i64,
    #[arg(long)]
    search: Option<String>,
}

#[derive(Subcommand)]
enum ItemsCommands {
    List(ItemsListArgs),
    Show {
        #[arg(long)]
        id: i32,
    },
}

#[derive(Args)]
struct ItemsListArgs {
    #[command(flatten)]
    page: PageArgs,
    #[arg(long)]
    section: Option<i32>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    sort_by: Option<String>,
    #[arg(long, action = ArgAction::SetTrue)]
    desc: bool,
}

#[derive(Subcommand)]
enum MovementsCommands {
    List(MovementsListArgs),
    Apply(MovementApplyArgs),
}

#[derive(Args)]
struct MovementsListArgs {
    #[command(flatten)]
    page: PageArgs,
    #[arg(long)]
    item: Option<i32>,
    #[arg(long)]
    user: Option<i32>,
    #[arg(long = "type")]
    movement_type: Option<String>,
    #[arg(long, help = "First day included (YYYY-MM-DD)")]
    from: Option<NaiveDate>,
    #[arg(long, help = "Last day included (YYYY-MM-DD)")]
    to: Option<NaiveDate>,
}

#[derive(Args)]
struct MovementApplyArgs {
    #[arg(long, help = "Id of the user performing the movement")]
    actor: i32,
    #[arg(long)]
    item: i32,
    #[arg(long = "type", help = "in, out, transfer, stocktake, damaged or scrapped")]
    movement_type: String,
    #[arg(long)]
    quantity: i32,
    #[arg(long, default_value = "")]
    from: String,
    #[arg(long, default_value = "")]
    to: String,
    #[arg(long, default_value = "")]
    reason: String,
    #[arg(long, default_value = "")]
    notes: String,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    services: AppServices,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        if config.auto_create_schema {
            db::create_schema(&db_pool)
                .await
                .context("failed to create schema")?;
        }

        let db = Arc::new(db_pool);
        let services = AppServices::new(db.clone(), &config);
        Ok(Self {
            config,
            db,
            services,
        })
    }

    async fn actor(&self, user_id: i32) -> Result<Actor> {
        let user = user::Entity::find_by_id(user_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| anyhow!("user {} not found", user_id))?;
        if !user.active {
            return Err(anyhow!("user {} is deactivated", user_id));
        }
        Ok(Actor::from(&user))
    }
}

async fn handle_init(context: &CliContext) -> Result<()> {
    db::check_connection(&context.db)
        .await
        .context("database is not reachable")?;
    db::create_schema(&context.db)
        .await
        .context("failed to create schema")?;
    info!(environment = %context.config.environment, "schema ready");
    println!("Schema ready");
    Ok(())
}

async fn handle_stats(context: &CliContext, args: StatsArgs, json: bool) -> Result<()> {
    let stats = &context.services.stats;
    match args.user {
        Some(user_id) => {
            let stats = stats.user_stats(user_id).await?;
            if json {
                return print_json(&stats);
            }
            println!(
                "Movements: {} total, {} in the last 7 days",
                stats.total_movements, stats.recent_movements
            );
            println!("Inbound movements: {}", stats.in_movements);
            println!(
                "Laboratories: {} • storages: {}",
                stats.laboratories, stats.storages
            );
        }
        None => {
            let stats = stats.dashboard().await?;
            if json {
                return print_json(&stats);
            }
            println!("Laboratories:     {}", stats.laboratories);
            println!("Storages:         {}", stats.storages);
            println!("Sections:         {}", stats.sections);
            println!("Items:            {}", stats.items);
            println!("Low stock:        {}", stats.low_stock_items);
            println!("Expiring (30d):   {}", stats.expiring_items);
            println!("Expired:          {}", stats.expired_items);
            println!("Users:            {}", stats.users);
            println!("Movements (7d):   {}", stats.recent_movements);
        }
    }
    Ok(())
}

async fn handle_low_stock(context: &CliContext, json: bool) -> Result<()> {
    let items = context.services.items.low_stock_items().await?;
    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("No items below their minimum quantity");
    }
    for details in &items {
        render_item(details);
    }
    Ok(())
}

async fn handle_expiring(context: &CliContext, args: ExpiringArgs, json: bool) -> Result<()> {
    let items = context.services.items.expiring_items(args.days).await?;
    if json {
        return print_json(&items);
    }
    let today = Utc::now().date_naive();
    for details in &items {
        let marker = if is_expired(details.item.expiry_date, today) {
            " [expired]"
        } else {
            ""
        };
        render_item(details);
        if let Some(date) = details.item.expiry_date {
            println!("    expires {}{}", date, marker);
        }
    }
    Ok(())
}

async fn handle_items_command(
    context: &CliContext,
    command: ItemsCommands,
    json: bool,
) -> Result<()> {
    let items = &context.services.items;
    match command {
        ItemsCommands::List(args) => {
            let mut request = page_request(args.page);
            if let Some(sort_by) = args.sort_by {
                request = request.sort(sort_by, args.desc);
            }
            let filter = ItemFilter {
                section_id: args.section,
                category: args.category,
                ..Default::default()
            };
            let page = items.list_items(filter, request).await?;
            if json {
                return print_json(&page);
            }
            for details in &page.items {
                render_item(details);
            }
            println!(
                "Page {}/{} • {} item(s)",
                page.page, page.total_pages, page.total
            );
        }
        ItemsCommands::Show { id } => {
            let details = items.get_item(id).await?;
            if json {
                return print_json(&details);
            }
            render_item(&details);
        }
    }
    Ok(())
}

async fn handle_movements_command(
    context: &CliContext,
    command: MovementsCommands,
    json: bool,
) -> Result<()> {
    let movements = &context.services.movements;
    match command {
        MovementsCommands::List(args) => {
            let filter = MovementFilter {
                item_id: args.item,
                user_id: args.user,
                movement_type: args.movement_type,
                start_date: args.from,
                end_date: args.to,
            };
            let page = movements
                .list_movements(filter, page_request(args.page))
                .await?;
            if json {
                return print_json(&page);
            }
            for view in &page.items {
                render_movement(view);
            }
            println!(
                "Page {}/{} • {} movement(s)",
                page.page, page.total_pages, page.total
            );
        }
        MovementsCommands::Apply(args) => {
            let actor = context.actor(args.actor).await?;
            let request = MovementRequest {
                item_id: args.item,
                movement_type: args.movement_type,
                quantity: args.quantity,
                from_location: args.from,
                to_location: args.to,
                reason: args.reason,
                notes: args.notes,
            };
            let applied = movements
                .apply_movement(request, &actor)
                .await
                .context("movement rejected")?;
            if json {
                return print_json(&applied);
            }
            println!(
                "Movement {} recorded • {} now at {} {}",
                applied.movement.id, applied.item.code, applied.item.quantity, applied.item.unit
            );
        }
    }
    Ok(())
}

fn page_request(args: PageArgs) -> PageRequest {
    let request = PageRequest::new(args.page, args.page_size);
    match args.search {
        Some(term) => request.search(term),
        None => request,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_item(details: &ItemDetails) {
    let item = &details.item;
    let low = if item.is_low_stock() { " [low]" } else { "" };
    println!(
        "- {} {} • {} {} (min {}){} • {}",
        item.code,
        item.name,
        item.quantity,
        item.unit,
        item.min_quantity,
        low,
        details.location.full_path
    );
}

fn render_movement(view: &MovementView) {
    let movement = &view.movement;
    println!(
        "- #{} {} {} x{} • {} → {} • by {} at {}",
        movement.id,
        movement.movement_type,
        view.item_name,
        movement.quantity,
        movement.from_location,
        movement.to_location,
        view.username,
        movement.created_at.format("%Y-%m-%d %H:%M")
    );
}
