use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;

use kursadmin::config::Config;
use kursadmin::crypto::MasterKey;
use kursadmin::db::{create_pool, init_audit_db, init_db, queries, AppState};
use kursadmin::email::EmailService;
use kursadmin::handlers;
use kursadmin::licensing;
use kursadmin::models::{
    ActorType, AdminRole, AuditAction, CreateAdminUser, CreateCompany, CreateCourse, CreatePerson,
    CreateProductLicense, CreateSession, SessionKind,
};
use kursadmin::rate_limit::{self, MemoryRateLimiter};
use kursadmin::util::AuditLogBuilder;

#[derive(Parser, Debug)]
#[command(name = "kursadmin")]
#[command(about = "KKS AS back-office: courses, credentials and licensing")]
struct Cli {
    /// Seed the database with dev data (admin user, course, company, product license)
    #[arg(long)]
    seed: bool,

    /// Delete databases on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Create the first admin user when the database has none. The API key is
/// printed once and never stored in plaintext.
fn bootstrap_admin(state: &AppState, email: &str) {
    let mut conn = state.db.get().expect("Failed to get db connection for bootstrap");

    let count = queries::count_admin_users(&conn).expect("Failed to count admin users");
    if count > 0 {
        tracing::info!("Admin users already exist, skipping bootstrap");
        return;
    }

    let input = CreateAdminUser {
        email: email.to_string(),
        name: "Bootstrap Admin".to_string(),
        role: AdminRole::Admin,
    };
    let admin = queries::create_admin_user(&conn, &input).expect("Failed to create bootstrap admin");
    let created = queries::create_admin_api_key(&mut conn, &admin.id, "bootstrap")
        .expect("Failed to create bootstrap API key");

    let audit_conn = state.audit.get().expect("Failed to get audit db connection");
    let no_headers = axum::http::HeaderMap::new();
    AuditLogBuilder::new(&audit_conn, state.audit_log_enabled, &no_headers)
        .actor(ActorType::System, None, None)
        .action(AuditAction::BootstrapAdmin)
        .resource("admin_user", &admin.id)
        .resource_name(&admin.name)
        .details(&serde_json::json!({ "email": email }))
        .save()
        .expect("Failed to write bootstrap audit log");

    tracing::info!("============================================");
    tracing::info!("BOOTSTRAP ADMIN CREATED");
    tracing::info!("Email: {}", email);
    tracing::info!("API Key: {}", created.key);
    tracing::info!("============================================");
    tracing::info!("SAVE THIS API KEY - IT WILL NOT BE SHOWN AGAIN");
    tracing::info!("============================================");
}

/// Seeds the database with dev data for manual testing.
/// Creates: admin user with key, course with a session, person, company with
/// trial license, and a product license. Only runs when the database is empty.
fn seed_dev_data(state: &AppState) {
    let mut conn = state.db.get().expect("Failed to get db connection for seeding");

    let count = queries::count_admin_users(&conn).expect("Failed to count admin users");
    if count > 0 {
        tracing::info!("Database already has data, skipping seed");
        return;
    }

    tracing::info!("============================================");
    tracing::info!("SEEDING DEV DATA");
    tracing::info!("============================================");

    let admin_input = CreateAdminUser {
        email: "dev@kks.local".to_string(),
        name: "Dev Admin".to_string(),
        role: AdminRole::Admin,
    };
    let admin = queries::create_admin_user(&conn, &admin_input).expect("Failed to create dev admin");
    let admin_key = queries::create_admin_api_key(&mut conn, &admin.id, "dev")
        .expect("Failed to create dev API key");
    tracing::info!("Admin: {} ({})", admin.email, admin.name);

    let course = queries::create_course(
        &conn,
        &CreateCourse {
            code: "HMS-100".to_string(),
            name: "HMS Grunnkurs".to_string(),
            description: Some("Grunnleggende helse, miljø og sikkerhet".to_string()),
            validity_months: Some(24),
            grace_days: Some(14),
        },
    )
    .expect("Failed to create dev course");
    let session = queries::create_session(
        &conn,
        &course.id,
        &CreateSession {
            kind: SessionKind::Classroom,
            starts_at: queries::now() + 7 * 86_400,
            ends_at: None,
            location: Some("Oslo".to_string()),
        },
    )
    .expect("Failed to create dev session");
    tracing::info!("Course: {} ({}), session {}", course.name, course.code, session.id);

    let person = queries::create_person(
        &conn,
        &CreatePerson {
            first_name: "Ola".to_string(),
            last_name: "Nordmann".to_string(),
            email: Some("ola@example.no".to_string()),
            birth_date: Some("1990-04-12".to_string()),
            phone: None,
        },
    )
    .expect("Failed to create dev person");
    queries::create_enrollment(&conn, &person.id, &session.id, "manual")
        .expect("Failed to create dev enrollment");
    tracing::info!("Person: {}", person.full_name());

    let outcome = licensing::create_company_with_trial(
        &mut conn,
        &CreateCompany {
            name: "Fjellsikring AS".to_string(),
            org_number: Some("987654321".to_string()),
            contact_email: Some("post@fjellsikring.no".to_string()),
        },
        "seed",
    )
    .expect("Failed to create dev company");
    tracing::info!(
        "Company: {} (trial until {:?})",
        outcome.company.name,
        outcome.license.end_date
    );

    let license_key = kursadmin::util::generate_license_key();
    let validation_token = kursadmin::util::generate_validation_token();
    let product_license = queries::insert_product_license(
        &conn,
        &CreateProductLicense {
            product_name: "KKS Booking".to_string(),
            customer_name: "Fjellsikring AS".to_string(),
            customer_email: Some("post@fjellsikring.no".to_string()),
            allowed_domain: Some("booking.fjellsikring.no".to_string()),
            max_users: Some(25),
            max_bookings_per_month: Some(500),
            features: None,
            expires_at: None,
        },
        &license_key,
        &kursadmin::crypto::hash_secret(&validation_token),
    )
    .expect("Failed to create dev product license");
    tracing::info!("Product license: {}", product_license.license_key);

    tracing::info!("============================================");
    tracing::info!("DEV DATA SEEDED SUCCESSFULLY");
    tracing::info!("============================================");

    // Copy-paste friendly block for local API clients
    println!();
    println!("--- COPY FROM HERE ---");
    println!("  admin_api_key: {}", admin_key.key);
    println!("  company_id: {}", outcome.company.id);
    println!("  course_id: {}", course.id);
    println!("  person_id: {}", person.id);
    println!("  license_key: {}", license_key);
    println!("  validation_token: {}", validation_token);
    println!("--- END COPY ---");
    println!();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kursadmin=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let master_key = match config.master_key.as_deref() {
        Some(encoded) => MasterKey::from_base64(encoded).expect("Invalid MASTER_KEY"),
        None if config.dev_mode => {
            tracing::warn!("MASTER_KEY not set; using an ephemeral key (dev mode only)");
            MasterKey::from_base64(&MasterKey::generate()).expect("Generated key must parse")
        }
        None => {
            eprintln!("MASTER_KEY (or MASTER_KEY_FILE) is required outside dev mode");
            std::process::exit(1);
        }
    };

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    let audit_pool =
        create_pool(&config.audit_database_path).expect("Failed to create audit database pool");

    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }
    {
        let conn = audit_pool.get().expect("Failed to get audit connection");
        init_audit_db(&conn).expect("Failed to initialize audit database");
    }

    let email_service = EmailService::new(config.resend_api_key.clone(), config.email_from.clone());
    if email_service.is_enabled() {
        tracing::info!("Email delivery enabled via Resend");
    } else {
        tracing::info!("Email delivery disabled (RESEND_API_KEY not set)");
    }

    if config.webhook_api_key.is_none() {
        tracing::warn!("BRANSJEKURS_API_KEY not set; the completion webhook will reject all calls");
    }

    let state = AppState {
        db: db_pool,
        audit: audit_pool,
        master_key,
        email_service,
        limiter: Arc::new(MemoryRateLimiter::new(config.rate_limit)),
        webhook_api_key: config.webhook_api_key.clone(),
        audit_log_enabled: config.audit_log_enabled,
        base_url: config.base_url.clone(),
    };

    // Purge old audit logs on startup (0 = never purge)
    if config.audit_log_retention_days > 0 {
        let conn = state.audit.get().expect("Failed to get audit connection for purge");
        match queries::purge_old_audit_logs(&conn, config.audit_log_retention_days) {
            Ok(count) if count > 0 => {
                tracing::info!(
                    "Purged {} audit log entries older than {} days",
                    count,
                    config.audit_log_retention_days
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to purge old audit logs: {}", e);
            }
        }
    }

    if cli.seed {
        if !config.dev_mode {
            tracing::warn!("--seed flag ignored: not in dev mode (set KKS_ENV=dev)");
        } else {
            seed_dev_data(&state);
        }
    }

    if let Some(ref email) = config.bootstrap_admin_email {
        bootstrap_admin(&state, email);
    }

    rate_limit::spawn_cleanup_task(state.limiter.clone());

    let app = Router::new()
        // Public endpoints (no auth)
        .merge(handlers::public::router())
        // Webhook endpoints (shared-secret auth)
        .merge(handlers::webhooks::router())
        // Admin API (API-key auth, role-layered)
        .merge(handlers::admin::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();
    let audit_path = config.audit_database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: databases will be deleted on exit");
    }

    tracing::info!("Kursadmin server listening on {}", addr);

    // into_make_service_with_connect_info so the validation endpoint can see
    // the caller's IP for rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral databases...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        if let Err(e) = std::fs::remove_file(&audit_path) {
            tracing::warn!("Failed to remove {}: {}", audit_path, e);
        } else {
            tracing::info!("Removed {}", audit_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
        let _ = std::fs::remove_file(format!("{}-wal", audit_path));
        let _ = std::fs::remove_file(format!("{}-shm", audit_path));
        tracing::info!("Ephemeral cleanup complete");
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
