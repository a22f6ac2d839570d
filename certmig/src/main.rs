// certmig/src/main.rs

mod requests;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

// Infrastructure (Config & Adapters)
use certmig_core::infrastructure::adapters::{DuckDbStore, Neo4jStore};
use certmig_core::infrastructure::config::{
    GraphEndpoint, RelationalEndpoint, StoreTopology,
};
use certmig_core::infrastructure::fs;

// Domain (CLI-facing types)
use certmig_core::domain::catalog::StoreRole;
use certmig_core::domain::district::{rank_districts, SelectionCriteria};
use certmig_core::domain::graph::GraphSolver;
use certmig_core::domain::tenant::TenantFilter;

// Application (Use Cases)
use certmig_core::application::coordinator::{
    run_migration, MigrationStores, RunOptions,
};
use certmig_core::application::{
    analyze, anonymize, extract, load, report, rollback, validate, CancelFlag,
    CONSISTENCY_MAP_FILE, EXTRACTION_MANIFEST_FILE, LOAD_MANIFEST_FILE, ROLLBACK_MANIFEST_FILE,
};
use certmig_core::ports::WriteStrategy;
use certmig_core::MigrationError;

use requests::*;

#[derive(Parser)]
#[command(name = "certmig")]
#[command(about = "District migration pipeline: extract, anonymize, validate, load", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 🧠 Builds the cross-store dependency graph from a catalog document on stdin
    Analyze {
        /// Also persist schema-analysis.json and dependencies.dot here
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },

    /// 📤 Extracts one store's tenant slice into the staging directory
    Extract,

    /// 🕵️  Applies the anonymization rules to a staging directory
    Anonymize,

    /// ✅ Runs the five validation families over a dataset directory
    Validate,

    /// 📥 Loads anonymized data into one CERT store
    Load,

    /// 🗑️  Deletes a tenant's rows from one CERT store (reverse order)
    Rollback,

    /// 📊 Aggregates a run's manifests into the final JSON + Markdown report
    Report,

    /// 🏫 Ranks districts by migration priority
    RankDistricts,

    /// 🚀 Runs the whole pipeline: extract → anonymize → validate → load → report
    Run {
        /// District to migrate
        #[arg(long)]
        district_id: String,

        /// Directory under which runs/{run_id} is created
        #[arg(long, default_value = ".")]
        run_root: PathBuf,

        /// Anonymization rules
        #[arg(long, default_value = "config/anonymization-rules.yaml")]
        rules_file: PathBuf,

        /// Validation rules (business / completeness / data quality)
        #[arg(long)]
        validation_rules: Option<PathBuf>,

        /// Loading strategy: insert, upsert or merge
        #[arg(long, default_value = "insert")]
        strategy: String,

        /// Comma-separated relational stores (default production topology)
        #[arg(long)]
        stores: Option<String>,

        /// Include the property-graph store
        #[arg(long, default_value = "false")]
        with_graph: bool,

        /// Stop after validation
        #[arg(long, default_value = "false")]
        validation_only: bool,

        /// Reuse an existing staging directory
        #[arg(long, default_value = "false")]
        skip_extraction: bool,

        /// Do not load into CERT
        #[arg(long, default_value = "false")]
        skip_load: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG=debug certmig ... for engine-level detail
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let _ = dotenvy::dotenv();

    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        let _ = ctrlc::set_handler(move || {
            eprintln!("⚠️  Cancel requested, finishing current row batch...");
            cancel.cancel();
        });
    }

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Analyze { output_dir } => cmd_analyze(output_dir),
        Commands::Extract => cmd_extract(&cancel).await,
        Commands::Anonymize => cmd_anonymize(&cancel),
        Commands::Validate => cmd_validate(),
        Commands::Load => cmd_load(&cancel).await,
        Commands::Rollback => cmd_rollback(&cancel).await,
        Commands::Report => cmd_report(),
        Commands::RankDistricts => cmd_rank(),
        Commands::Run {
            district_id,
            run_root,
            rules_file,
            validation_rules,
            strategy,
            stores,
            with_graph,
            validation_only,
            skip_extraction,
            skip_load,
        } => {
            cmd_run(
                district_id,
                run_root,
                rules_file,
                validation_rules,
                strategy,
                stores,
                with_graph,
                validation_only,
                skip_extraction,
                skip_load,
                &cancel,
            )
            .await
        }
    };

    match outcome {
        Ok(success) => {
            if !success {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            let doc = ErrorResponse::from_error(&e);
            println!(
                "{}",
                serde_json::to_string_pretty(&doc)
                    .unwrap_or_else(|_| r#"{"success":false}"#.to_string())
            );
            eprintln!("💥 {}", e);
            std::process::exit(1);
        }
    }
}

fn read_request<T: serde::de::DeserializeOwned>() -> Result<T, MigrationError> {
    serde_json::from_reader(std::io::stdin())
        .map_err(|e| certmig_core::infrastructure::InfrastructureError::Json(e).into())
}

fn print_document<T: serde::Serialize>(doc: &T) -> Result<(), MigrationError> {
    let rendered = serde_json::to_string_pretty(doc)
        .map_err(certmig_core::infrastructure::InfrastructureError::Json)?;
    println!("{}", rendered);
    Ok(())
}

fn parse_strategy(raw: &str) -> Result<WriteStrategy, MigrationError> {
    raw.parse::<WriteStrategy>().map_err(|e| {
        certmig_core::infrastructure::InfrastructureError::Config(e).into()
    })
}

// --- STAGE: ANALYZE ---
fn cmd_analyze(output_dir: Option<PathBuf>) -> Result<bool, MigrationError> {
    let doc: CatalogDocument = read_request()?;
    let tables = doc.into_tables();
    let analysis = GraphSolver::analyze(&tables);

    if let Some(dir) = output_dir {
        analyze::save_analysis(&dir, &analysis, true)?;
    }

    print_document(&serde_json::json!({
        "success": true,
        "dependency_graph": analysis.dependency_graph,
        "extraction_order": analysis.extraction_order,
        "extraction_by_store": analysis.extraction_by_store,
        "circular_dependencies": analysis.circular_dependencies,
        "has_cycles": analysis.has_cycles,
        "total_tables": analysis.total_tables,
        "total_relationships": analysis.total_relationships,
    }))?;
    Ok(true)
}

// --- STAGE: EXTRACT ---
async fn cmd_extract(cancel: &CancelFlag) -> Result<bool, MigrationError> {
    let request: ExtractRequest = read_request()?;
    let topology = StoreTopology::default();
    let store_id = request.source_config.store.to_lowercase();
    if !topology.is_graph(&store_id) && !topology.relational.contains(&store_id) {
        return Err(extract::unknown_store_error(&store_id));
    }
    let filter = TenantFilter::district(request.filter.district_id.clone());
    let output_dir = PathBuf::from(&request.output_dir);
    let role = request.source_config.role(StoreRole::Source);

    let manifest = if topology.is_graph(&store_id) {
        let endpoint = GraphEndpoint::from_env(role)?;
        let store = Neo4jStore::connect(&store_id, &endpoint).await?;
        extract::extract_graph(
            &store,
            &filter,
            topology.graph_traversal_depth,
            &output_dir,
            cancel,
        )
        .await?
    } else {
        let endpoint = RelationalEndpoint::from_env(role, &store_id)?;
        let store = DuckDbStore::open(&endpoint)?;

        let mut analysis = analyze::analyze_stores(&[&store]).await?;
        if let Some(order) = request.extraction_order {
            // The caller's order wins over the locally derived one
            analysis.extraction_by_store.insert(store_id.clone(), order);
        }

        extract::extract_relational(&store, &analysis, &filter, &output_dir, cancel).await?
    };

    fs::write_json(output_dir.join(EXTRACTION_MANIFEST_FILE), &manifest)?;
    let success = manifest.success;
    print_document(&manifest)?;
    Ok(success)
}

// --- STAGE: ANONYMIZE ---
fn cmd_anonymize(cancel: &CancelFlag) -> Result<bool, MigrationError> {
    let request: AnonymizeRequest = read_request()?;
    let output_dir = PathBuf::from(&request.output_dir);
    let map_path = request
        .consistency_map
        .map(PathBuf::from)
        .unwrap_or_else(|| output_dir.join(CONSISTENCY_MAP_FILE));

    let report = anonymize::run(
        &PathBuf::from(&request.input_dir),
        &output_dir,
        &PathBuf::from(&request.rules_file),
        &map_path,
        cancel,
    )?;

    let success = report.success;
    print_document(&report)?;
    Ok(success)
}

// --- STAGE: VALIDATE ---
fn cmd_validate() -> Result<bool, MigrationError> {
    let request: ValidateRequest = read_request()?;
    let data_dir = PathBuf::from(&request.data_dir);
    let output_report = request
        .output_report
        .map(PathBuf::from)
        .unwrap_or_else(|| data_dir.join("validation-report.json"));

    let report = validate::run(
        &data_dir,
        request.schema_file.map(PathBuf::from).as_deref(),
        request.validation_rules.map(PathBuf::from).as_deref(),
        &output_report,
    )?;

    let success = report.success;
    print_document(&report)?;
    Ok(success)
}

// --- STAGE: LOAD ---
async fn cmd_load(cancel: &CancelFlag) -> Result<bool, MigrationError> {
    let request: LoadRequest = read_request()?;
    let topology = StoreTopology::default();
    let store_id = request.target_config.store.to_lowercase();
    if !topology.is_graph(&store_id) && !topology.relational.contains(&store_id) {
        return Err(extract::unknown_store_error(&store_id));
    }
    let input_dir = PathBuf::from(&request.input_dir);
    let strategy = parse_strategy(&request.strategy)?;
    let role = request.target_config.role(StoreRole::Target);

    let manifest = if topology.is_graph(&store_id) {
        let endpoint = GraphEndpoint::from_env(role)?;
        let store = Neo4jStore::connect(&store_id, &endpoint).await?;
        load::load_graph(&store, &input_dir, cancel).await?
    } else {
        let endpoint = RelationalEndpoint::from_env(role, &store_id)?;
        let store = DuckDbStore::open(&endpoint)?;
        let order = request.loading_order.unwrap_or_default();
        load::load_relational(&store, &input_dir, &order, strategy, cancel).await?
    };

    fs::write_json(input_dir.join(LOAD_MANIFEST_FILE), &manifest)?;
    let success = manifest.success;
    print_document(&manifest)?;
    Ok(success)
}

// --- STAGE: ROLLBACK ---
async fn cmd_rollback(cancel: &CancelFlag) -> Result<bool, MigrationError> {
    let request: RollbackRequest = read_request()?;
    let topology = StoreTopology::default();
    let store_id = request.target_config.store.to_lowercase();
    let filter = TenantFilter::district(request.filter.district_id.clone());
    let started = std::time::Instant::now();
    let role = request.target_config.role(StoreRole::Target);

    let store_result = if topology.is_graph(&store_id) {
        let endpoint = GraphEndpoint::from_env(role)?;
        let store = Neo4jStore::connect(&store_id, &endpoint).await?;
        rollback::rollback_graph(&store, &filter, topology.graph_traversal_depth, cancel).await?
    } else {
        let endpoint = RelationalEndpoint::from_env(role, &store_id)?;
        let store = DuckDbStore::open(&endpoint)?;

        let analysis = match &request.schema_file {
            Some(path) => analyze::load_analysis(&PathBuf::from(path))?,
            None => analyze::analyze_stores(&[&store]).await?,
        };
        rollback::rollback_relational(&store, &analysis, &filter, cancel).await?
    };

    let manifest = rollback::RollbackManifest::from_stores(
        &filter,
        vec![store_result],
        started.elapsed().as_secs_f64(),
    );
    let manifest_dir = request
        .output_dir
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::write_json(manifest_dir.join(ROLLBACK_MANIFEST_FILE), &manifest)?;
    let success = manifest.success;
    print_document(&manifest)?;
    Ok(success)
}

// --- STAGE: REPORT ---
fn cmd_report() -> Result<bool, MigrationError> {
    let request: ReportRequest = read_request()?;
    let output_dir = PathBuf::from(&request.output_dir);

    let final_report = report::build(&output_dir, &request.run_id, &request.district_id);
    report::write(&final_report, &output_dir)?;

    let success = final_report.overall_success;
    print_document(&final_report)?;
    Ok(success)
}

// --- STAGE: RANK DISTRICTS ---
fn cmd_rank() -> Result<bool, MigrationError> {
    let request: RankRequest = read_request()?;
    let criteria = request.selection_criteria.unwrap_or_else(SelectionCriteria::default);
    let outcome = rank_districts(request.districts, &criteria, request.top_n);

    print_document(&serde_json::json!({
        "success": true,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "total_districts_analyzed": outcome.total_districts_analyzed,
        "recommended_districts": outcome.recommended_districts,
        "selection_criteria": outcome.selection_criteria,
        "districts": outcome.districts,
        "summary": outcome.summary,
    }))?;
    Ok(true)
}

// --- USE CASE: FULL PIPELINE ---
#[allow(clippy::too_many_arguments)]
async fn cmd_run(
    district_id: String,
    run_root: PathBuf,
    rules_file: PathBuf,
    validation_rules: Option<PathBuf>,
    strategy: String,
    stores_arg: Option<String>,
    with_graph: bool,
    validation_only: bool,
    skip_extraction: bool,
    skip_load: bool,
    cancel: &CancelFlag,
) -> Result<bool, MigrationError> {
    let mut topology = StoreTopology::default();
    if let Some(list) = stores_arg {
        topology.relational = list
            .split(',')
            .map(|s| s.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    println!("⚙️  Connecting to {} relational stores...", topology.relational.len());
    let mut stores = MigrationStores::default();
    for name in &topology.relational {
        let source = RelationalEndpoint::from_env(StoreRole::Source, name)?;
        stores
            .sources
            .push(Arc::new(DuckDbStore::open(&source)?));
        if !validation_only && !skip_load {
            let target = RelationalEndpoint::from_env(StoreRole::Target, name)?;
            stores
                .targets
                .push(Arc::new(DuckDbStore::open(&target)?));
        }
    }
    if with_graph {
        if let Some(graph_id) = topology.graph.first() {
            let source = GraphEndpoint::from_env(StoreRole::Source)?;
            stores.graph_source =
                Some(Arc::new(Neo4jStore::connect(graph_id, &source).await?));
            if !validation_only && !skip_load {
                let target = GraphEndpoint::from_env(StoreRole::Target)?;
                stores.graph_target =
                    Some(Arc::new(Neo4jStore::connect(graph_id, &target).await?));
            }
        }
    }

    let mut opts = RunOptions::new(district_id, run_root, rules_file);
    opts.validation_rules_file = validation_rules;
    opts.strategy = parse_strategy(&strategy)?;
    opts.validation_only = validation_only;
    opts.skip_extraction = skip_extraction;
    opts.skip_load = skip_load;
    opts.graph_traversal_depth = topology.graph_traversal_depth;

    let summary = run_migration(&stores, &opts, cancel).await?;

    if summary.success {
        println!("✨ Migration {} complete.", summary.run_id);
    } else {
        eprintln!(
            "❌ Migration {} failed in phase {:?}.",
            summary.run_id, summary.failed_phase
        );
    }
    let success = summary.success;
    print_document(&summary)?;
    Ok(success)
}
