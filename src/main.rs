// Entry point and high-level CLI flow.
//
// - Option [1] loads the project, activity and KPI exports.
// - Option [2] generates the three progress reports and a JSON summary.
// - Option [3] reconciles project statuses and writes them back.
// - Option [4] records an unsaved quantity for an activity.
use site_progress::aggregate::PendingQuantities;
use site_progress::store::{self, DatabaseUpdated, MemoryStore, ProjectStore, Snapshot, UpdateBus};
use site_progress::{config, loader, output, reports, status, util};
use std::io::{self, Write};
use std::sync::mpsc::Receiver;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Everything the menu actions share. Built once in `main` and passed down.
struct App {
    settings: config::Settings,
    store: Option<MemoryStore>,
    snapshot: Option<Snapshot>,
    pending: PendingQuantities,
    bus: UpdateBus,
    updates: Receiver<DatabaseUpdated>,
}

impl App {
    fn new(settings: config::Settings) -> Self {
        let mut bus = UpdateBus::new();
        let updates = bus.subscribe();
        Self {
            settings,
            store: None,
            snapshot: None,
            pending: PendingQuantities::new(),
            bus,
            updates,
        }
    }

    /// Re-read the snapshot when the store announced a change.
    fn refresh_on_updates(&mut self) {
        let events: Vec<DatabaseUpdated> = self.updates.try_iter().collect();
        let Some(last) = events.last() else {
            return;
        };
        info!(
            table = %last.table_name,
            at = %last.timestamp,
            events = events.len(),
            "database updated, refreshing snapshot"
        );
        if let Some(store) = self.store.as_mut() {
            match store::load_snapshot(store) {
                Ok(snapshot) => self.snapshot = Some(snapshot),
                Err(e) => error!(error = %e, "refresh failed"),
            }
        }
    }
}

fn prompt(label: &str) -> String {
    print!("{}", label);
    let _ = io::stdout().flush();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).ok();
    buf.trim().to_string()
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
fn read_choice() -> String {
    prompt("Enter choice: ")
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        match prompt("Back to Menu (Y/N): ").to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

/// Handle option [1]: load the exports into a fresh store.
fn handle_load(app: &mut App) {
    let data = &app.settings.data;
    let loaded = loader::load_store(&data.projects, &data.activities, &data.kpis);
    let (mut store, report) = match loaded {
        Ok(v) => v,
        Err(e) => {
            error!(error = %e, "load failed");
            eprintln!("Failed to load files: {}\n", e);
            return;
        }
    };
    let snapshot = match store::load_snapshot(&mut store) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read store: {}\n", e);
            return;
        }
    };

    println!(
        "Processing data... ({} projects, {} activities, {} KPI records)",
        util::format_int(report.projects),
        util::format_int(report.activities),
        util::format_int(report.kpis)
    );
    if report.parse_errors > 0 || report.skipped_projects > 0 {
        println!(
            "Note: {} rows skipped due to parse errors, {} projects without a code.",
            util::format_int(report.parse_errors),
            util::format_int(report.skipped_projects)
        );
    }
    if report.undated_kpis > 0 {
        println!(
            "Info: {} KPI records have no usable date and count as already due.",
            util::format_int(report.undated_kpis)
        );
    }
    for (full_code, count) in reports::activity_counts(&snapshot) {
        tracing::debug!(project = %full_code, activities = count, "project loaded");
    }
    println!();

    app.pending.clear();
    app.store = Some(store);
    app.snapshot = Some(snapshot);
}

fn export<T: serde::Serialize>(app: &App, file: &str, rows: &[T]) {
    if let Err(e) = output::write_csv(&app.settings.output_path(file), rows) {
        error!(file, error = %e, "write failed");
        eprintln!("Write error: {}", e);
    }
}

/// Handle option [2]: generate all reports and the JSON summary.
fn handle_generate_reports(app: &App) {
    let Some(snapshot) = app.snapshot.as_ref() else {
        println!("Error: No data loaded. Please load the files first (option 1).\n");
        return;
    };
    let today = app.settings.today();
    let rows = app.settings.output.preview_rows;

    println!("Generating reports as of {}...", today.format("%Y-%m-%d"));
    println!("Outputs saved to individual files...\n");

    let r1 = reports::generate_project_summary(snapshot, today, &app.pending);
    let file1 = "report1_project_summary.csv";
    export(app, file1, &r1);
    println!("Report 1: Project Progress Summary");
    println!("(Earned vs. planned value, KPIs until yesterday)\n");
    output::preview_table_rows(&r1, rows);
    println!("(Full table exported to {})\n", file1);

    let r2 = reports::generate_activity_progress(snapshot, today, &app.pending);
    let file2 = "report2_activity_progress.csv";
    export(app, file2, &r2);
    println!("Report 2: BOQ Activity Progress");
    println!("(Done / Planned / Total per activity and zone)\n");
    output::preview_table_rows(&r2, rows);
    println!("(Full table exported to {})\n", file2);

    let r3 = reports::generate_kpi_timeline(snapshot, today);
    let file3 = "report3_kpi_timeline.csv";
    export(app, file3, &r3);
    println!("Report 3: Monthly KPI Timeline");
    println!("(Planned vs. Actual quantities by month)\n");
    output::preview_table_rows(&r3, rows);
    println!("(Full table exported to {})\n", file3);

    let summary = reports::generate_summary(snapshot, today, &app.pending);
    if let Err(e) = output::write_json(&app.settings.output_path("summary.json"), &summary) {
        eprintln!("Write error: {}", e);
    }
    println!("Summary Stats (summary.json):");
    println!(
        "{{\"overall_progress_pct\": {}, \"total_earned\": {}}}\n",
        util::format_number(summary.overall_progress_pct, 2),
        util::format_number(summary.total_earned, 2)
    );
}

/// Handle option [3]: classify every project and write changed statuses back.
fn handle_reconcile_statuses(app: &mut App) {
    let (Some(store), Some(snapshot)) = (app.store.as_mut(), app.snapshot.as_ref()) else {
        println!("Error: No data loaded. Please load the files first (option 1).\n");
        return;
    };
    let now = app.settings.now();
    let outcomes =
        status::reconcile_all(store, &mut app.bus, &snapshot.projects, &snapshot.kpis, now);

    let changed: Vec<_> = outcomes.iter().filter(|o| o.changed()).collect();
    println!(
        "Reconciled {} projects, {} status changes.",
        util::format_int(outcomes.len()),
        util::format_int(changed.len())
    );
    for o in &changed {
        let before = o.previous.map(|s| s.label()).unwrap_or("(none)");
        let saved = match &o.write_back {
            Some(Ok(())) => "saved",
            Some(Err(_)) => "NOT saved",
            None => "unchanged",
        };
        println!("  {}: {} -> {} ({})", o.full_code, before, o.status.label(), saved);
    }

    let file = "projects_reconciled.csv";
    if let Some(store) = app.store.as_ref() {
        export(app, file, &store.export_projects());
        println!("(Project table exported to {})\n", file);
    }
    app.refresh_on_updates();
}

/// Handle option [4]: hold a quantity for an activity without saving it.
fn handle_pending_quantity(app: &mut App) {
    let Some(store) = app.store.as_ref() else {
        println!("Error: No data loaded. Please load the files first (option 1).\n");
        return;
    };
    let id = prompt("Activity id: ");
    let known = store
        .fetch_activities()
        .map(|acts| acts.iter().any(|a| a.id == id))
        .unwrap_or(false);
    if !known {
        println!("Unknown activity id '{}'.\n", id);
        return;
    }
    let qty_text = prompt("Quantity done today: ");
    match util::parse_f64_lenient(Some(qty_text.as_str())) {
        Some(qty) => {
            app.pending.set(&id, qty);
            println!("Held {} for {} (included in reports until reload).\n", qty, id);
        }
        None => println!("Invalid quantity.\n"),
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = match config::read_config() {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "invalid configuration");
            eprintln!("Failed to read configuration: {}", e);
            std::process::exit(1);
        }
    };
    info!(today = %settings.today(), "site progress starting");
    let mut app = App::new(settings);

    loop {
        println!("Select Action:");
        println!("[1] Load the files");
        println!("[2] Generate Reports");
        println!("[3] Reconcile Project Statuses");
        println!("[4] Enter Today's Quantity\n");
        match read_choice().as_str() {
            "1" => handle_load(&mut app),
            "2" => {
                println!();
                handle_generate_reports(&app);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            "3" => handle_reconcile_statuses(&mut app),
            "4" => handle_pending_quantity(&mut app),
            _ => println!("Invalid choice. Please enter 1, 2, 3 or 4.\n"),
        }
    }
}
