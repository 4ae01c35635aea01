use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::info;

use flexdesk::config::OfficeDirectory;
use flexdesk::engine::{Engine, RetryPolicy};
use flexdesk::model::{CellKey, Period, Release, RequestedPeriod, TableView};
use flexdesk::session::PasswordGate;
use flexdesk::store::CsvSheetStore;

#[derive(Parser)]
#[command(name = "flexdesk")]
#[command(about = "Half-day desk reservations for flex offices")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Shared office password
    #[arg(long, short, default_value = "")]
    password: String,

    /// Name recorded for cancellation checks
    #[arg(long, short)]
    user: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured offices and their rosters.
    Offices,

    /// Write a fresh all-available table for an office.
    Seed {
        office: String,
        /// First date (defaults to today)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Calendar days to cover
        #[arg(long, default_value = "60")]
        days: u32,
        /// Replace an existing table
        #[arg(long)]
        overwrite: bool,
    },

    /// Show availability for a date window.
    Show {
        office: String,
        /// First date (defaults to today)
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long, default_value = "1")]
        days: u32,
        /// Matin or Après-midi; both when omitted
        #[arg(long)]
        period: Option<Period>,
    },

    /// Show availability across the office horizon.
    Horizon { office: String },

    /// Reserve a desk for a half-day or a whole day.
    Reserve {
        office: String,
        date: NaiveDate,
        /// Matin, Après-midi or Journée
        period: RequestedPeriod,
        resource: String,
        occupant: String,
    },

    /// Reserve several cells at once, all or nothing.
    ReserveBulk {
        office: String,
        occupant: String,
        /// DATE/PERIOD/RESOURCE, repeatable
        #[arg(long = "cell", required = true, value_parser = parse_cell)]
        cells: Vec<CellKey>,
    },

    /// Free a desk for a half-day or a whole day.
    Cancel {
        office: String,
        date: NaiveDate,
        period: RequestedPeriod,
        resource: String,
    },
}

fn parse_cell(s: &str) -> Result<CellKey, String> {
    let mut parts = s.splitn(3, '/');
    let (Some(date), Some(period), Some(resource)) = (parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("expected DATE/PERIOD/RESOURCE, got {s:?}"));
    };
    let date: NaiveDate = date.parse().map_err(|e| format!("{date:?}: {e}"))?;
    let period: Period = period.parse()?;
    Ok(CellKey::new(date, period, resource))
}

fn print_view(view: &TableView) {
    if view.is_empty() {
        println!("(no bookable slots)");
        return;
    }
    println!("Date\tCréneau\t{}", view.resources.join("\t"));
    for row in &view.rows {
        let cells: Vec<&str> = row
            .cells
            .iter()
            .map(|c| c.occupant().unwrap_or(flexdesk::sheet::AVAILABLE_SENTINEL))
            .collect();
        println!("{}\t{}\t{}", row.date, row.period, cells.join("\t"));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let metrics_port: Option<u16> = std::env::var("FLEXDESK_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok());
    flexdesk::observability::init(metrics_port)?;

    let data_dir = std::env::var("FLEXDESK_DATA_DIR").unwrap_or_else(|_| "./data".into());
    let secret = std::env::var("FLEXDESK_PASSWORD").unwrap_or_else(|_| "FLEXDESK".into());
    let timeout_ms: u64 = std::env::var("FLEXDESK_STORE_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(10_000);
    let attempts: u32 = std::env::var("FLEXDESK_STORE_RETRIES")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3);

    let offices = match std::env::var("FLEXDESK_OFFICES") {
        Ok(path) => OfficeDirectory::from_path(&PathBuf::from(path))?,
        Err(_) => OfficeDirectory::builtin(),
    };

    std::fs::create_dir_all(&data_dir)?;
    info!("data_dir: {data_dir}");

    let store = Arc::new(CsvSheetStore::new(&data_dir));
    let engine = Engine::new(store, offices).with_retry_policy(RetryPolicy {
        attempts,
        timeout: Duration::from_millis(timeout_ms),
        ..RetryPolicy::default()
    });

    let session = PasswordGate::new(secret).unlock(&cli.password, cli.user.clone());
    let today = engine.today();

    match cli.command {
        Commands::Offices => {
            for office in engine.list_offices() {
                println!(
                    "{}\t{}\t{} days\t{}",
                    office.name,
                    office.storage_key,
                    office.horizon_days,
                    office.resources.join(", ")
                );
            }
        }
        Commands::Seed {
            office,
            from,
            days,
            overwrite,
        } => {
            let rows = engine
                .seed_office(&session, &office, from.unwrap_or(today), days, overwrite)
                .await?;
            println!("{office}: {rows} rows written");
        }
        Commands::Show {
            office,
            from,
            days,
            period,
        } => {
            let view = engine
                .query_availability(&session, &office, from.unwrap_or(today), days, period)
                .await?;
            print_view(&view);
        }
        Commands::Horizon { office } => {
            let view = engine.horizon_view(&session, &office).await?;
            print_view(&view);
            println!("{} available cells", view.available_cells().len());
        }
        Commands::Reserve {
            office,
            date,
            period,
            resource,
            occupant,
        } => {
            let view = engine
                .reserve(&session, &office, date, period, &resource, &occupant)
                .await?;
            print_view(&view);
        }
        Commands::ReserveBulk {
            office,
            occupant,
            cells,
        } => {
            let reserved = engine
                .reserve_bulk(&session, &office, &cells, &occupant)
                .await?;
            for key in reserved {
                println!("reserved {key}");
            }
        }
        Commands::Cancel {
            office,
            date,
            period,
            resource,
        } => {
            let released = engine
                .cancel(&session, &office, date, period, &resource)
                .await?;
            for segment in released {
                match segment.release {
                    Release::Freed { previous } => {
                        println!("{date} {}: freed (was {previous})", segment.period)
                    }
                    Release::AlreadyAvailable => {
                        println!("{date} {}: already available", segment.period)
                    }
                }
            }
        }
    }
    Ok(())
}
