use rusqlite::Connection;

/// Initialize the main database schema (everything except audit logs)
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Customer companies using the booking product
        -- license_status mirrors the current license row; EXPIRED is derived
        -- at read time and never stored
        CREATE TABLE IF NOT EXISTS companies (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            org_number TEXT,
            contact_email TEXT,
            license_status TEXT NOT NULL CHECK (license_status IN ('TRIAL', 'ACTIVE', 'SUSPENDED', 'CANCELLED')),
            suspended_at INTEGER,
            suspended_reason TEXT,
            current_license_id TEXT REFERENCES licenses(id),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_companies_status ON companies(license_status);
        CREATE UNIQUE INDEX IF NOT EXISTS idx_companies_org_number ON companies(org_number) WHERE org_number IS NOT NULL;

        -- Company licenses. Rows are never deleted; suspend/resume update in
        -- place and append to license_activities
        CREATE TABLE IF NOT EXISTS licenses (
            id TEXT PRIMARY KEY,
            company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
            plan_name TEXT,
            status TEXT NOT NULL CHECK (status IN ('TRIAL', 'ACTIVE', 'SUSPENDED', 'CANCELLED')),
            start_date INTEGER NOT NULL,
            end_date INTEGER,
            grace_period_days INTEGER NOT NULL DEFAULT 0,
            suspended_at INTEGER,
            suspended_reason TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_licenses_company ON licenses(company_id);
        CREATE INDEX IF NOT EXISTS idx_licenses_status ON licenses(status);

        -- Append-only license state transition trail
        CREATE TABLE IF NOT EXISTS license_activities (
            id TEXT PRIMARY KEY,
            license_id TEXT NOT NULL REFERENCES licenses(id) ON DELETE CASCADE,
            company_id TEXT NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
            action TEXT NOT NULL CHECK (action IN ('CREATED', 'SUSPENDED', 'RESUMED', 'EXTENDED')),
            performed_by TEXT NOT NULL,
            details TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_license_activities_license ON license_activities(license_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_license_activities_company ON license_activities(company_id);

        -- Course participants (GDPR data subjects)
        CREATE TABLE IF NOT EXISTS persons (
            id TEXT PRIMARY KEY,
            first_name TEXT NOT NULL,
            last_name TEXT NOT NULL,
            email TEXT,
            birth_date TEXT,
            phone TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_persons_email ON persons(email);
        CREATE INDEX IF NOT EXISTS idx_persons_name_birth ON persons(first_name, last_name, birth_date);

        -- Documents attached to a person (diplomas, certificates of completion)
        CREATE TABLE IF NOT EXISTS documents (
            id TEXT PRIMARY KEY,
            person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            category TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_person ON documents(person_id);

        -- Physical access cards issued to persons
        CREATE TABLE IF NOT EXISTS access_cards (
            id TEXT PRIMARY KEY,
            person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
            card_number TEXT NOT NULL,
            issued_at INTEGER NOT NULL,
            expires_at INTEGER,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_access_cards_person ON access_cards(person_id);

        -- Policy acknowledgments (HMS policies, privacy statements)
        CREATE TABLE IF NOT EXISTS policy_acknowledgments (
            id TEXT PRIMARY KEY,
            person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
            policy_name TEXT NOT NULL,
            acknowledged_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_policy_acks_person ON policy_acknowledgments(person_id);

        -- Course catalog. validity_months/grace_days is the credential policy
        -- applied at issue time; NULL validity_months means no expiry
        CREATE TABLE IF NOT EXISTS courses (
            id TEXT PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT,
            validity_months INTEGER,
            grace_days INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Scheduled course sessions
        CREATE TABLE IF NOT EXISTS course_sessions (
            id TEXT PRIMARY KEY,
            course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            kind TEXT NOT NULL CHECK (kind IN ('CLASSROOM', 'DIGITAL')),
            starts_at INTEGER NOT NULL,
            ends_at INTEGER,
            location TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_course ON course_sessions(course_id, starts_at DESC);

        -- Enrollments. source is 'manual' or 'bransjekurs'
        CREATE TABLE IF NOT EXISTS enrollments (
            id TEXT PRIMARY KEY,
            person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
            session_id TEXT NOT NULL REFERENCES course_sessions(id) ON DELETE CASCADE,
            source TEXT NOT NULL DEFAULT 'manual',
            completed_at INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(person_id, session_id)
        );
        CREATE INDEX IF NOT EXISTS idx_enrollments_person ON enrollments(person_id);
        CREATE INDEX IF NOT EXISTS idx_enrollments_session ON enrollments(session_id);
        CREATE INDEX IF NOT EXISTS idx_enrollments_completed ON enrollments(completed_at) WHERE completed_at IS NOT NULL;

        -- Assessment results, one per enrollment
        CREATE TABLE IF NOT EXISTS assessments (
            id TEXT PRIMARY KEY,
            enrollment_id TEXT NOT NULL UNIQUE REFERENCES enrollments(id) ON DELETE CASCADE,
            passed INTEGER NOT NULL,
            score REAL,
            assessed_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Issued credentials (course certificates). valid_to/grace_days are
        -- frozen from the course policy at issue time; NULL valid_to means
        -- the credential never expires
        CREATE TABLE IF NOT EXISTS credentials (
            id TEXT PRIMARY KEY,
            person_id TEXT NOT NULL REFERENCES persons(id) ON DELETE CASCADE,
            course_id TEXT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
            enrollment_id TEXT REFERENCES enrollments(id) ON DELETE SET NULL,
            verification_code TEXT NOT NULL UNIQUE,
            valid_from INTEGER NOT NULL,
            valid_to INTEGER,
            grace_days INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_credentials_person ON credentials(person_id);
        CREATE INDEX IF NOT EXISTS idx_credentials_course ON credentials(course_id);
        CREATE INDEX IF NOT EXISTS idx_credentials_person_course ON credentials(person_id, course_id);
        CREATE INDEX IF NOT EXISTS idx_credentials_valid_to ON credentials(valid_to) WHERE valid_to IS NOT NULL;

        -- Sold product licenses validated by customer installations
        CREATE TABLE IF NOT EXISTS product_licenses (
            id TEXT PRIMARY KEY,
            product_name TEXT NOT NULL,
            customer_name TEXT NOT NULL,
            customer_email TEXT,
            license_key TEXT NOT NULL UNIQUE,
            validation_token_hash TEXT NOT NULL,
            allowed_domain TEXT,
            max_users INTEGER NOT NULL DEFAULT 10,
            max_bookings_per_month INTEGER NOT NULL DEFAULT 1000,
            features TEXT NOT NULL DEFAULT '{}',
            active INTEGER NOT NULL DEFAULT 1,
            expires_at INTEGER,
            activated_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_product_licenses_key ON product_licenses(license_key);

        -- Validation attempts that reached license lookup (rate-limited
        -- rejections are not recorded here)
        CREATE TABLE IF NOT EXISTS validation_records (
            id TEXT PRIMARY KEY,
            product_license_id TEXT REFERENCES product_licenses(id) ON DELETE SET NULL,
            license_key TEXT NOT NULL,
            success INTEGER NOT NULL,
            failure_reason TEXT,
            source_ip TEXT,
            source_domain TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_validation_records_license ON validation_records(product_license_id, created_at DESC);
        CREATE INDEX IF NOT EXISTS idx_validation_records_time ON validation_records(created_at);

        -- KPI snapshots, append-only per metric
        CREATE TABLE IF NOT EXISTS kpis (
            id TEXT PRIMARY KEY,
            metric TEXT NOT NULL,
            value REAL NOT NULL,
            note TEXT,
            computed_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_kpis_metric_time ON kpis(metric, computed_at DESC);

        -- Back-office users
        CREATE TABLE IF NOT EXISTS admin_users (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            role TEXT NOT NULL CHECK (role IN ('VIEWER', 'MANAGER', 'ADMIN')),
            totp_secret_enc BLOB,
            totp_enabled INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Admin API keys (hash stored, prefix kept for display)
        CREATE TABLE IF NOT EXISTS admin_api_keys (
            id TEXT PRIMARY KEY,
            admin_user_id TEXT NOT NULL REFERENCES admin_users(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            key_hash TEXT NOT NULL UNIQUE,
            key_prefix TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            last_used_at INTEGER,
            created_at INTEGER NOT NULL,
            UNIQUE(admin_user_id, name)
        );
        CREATE INDEX IF NOT EXISTS idx_admin_api_keys_user ON admin_api_keys(admin_user_id);

        -- Webhook events (replay prevention). enrollment_id is stored so a
        -- replayed delivery can return the original result
        CREATE TABLE IF NOT EXISTS webhook_events (
            id TEXT PRIMARY KEY,
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            enrollment_id TEXT,
            created_at INTEGER NOT NULL,
            UNIQUE(provider, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_lookup ON webhook_events(provider, event_id);
        "#,
    )?;
    Ok(())
}

/// Initialize the audit log database schema (separate DB file)
/// Optimized for append-only workload with WAL mode
pub fn init_audit_db(conn: &Connection) -> rusqlite::Result<()> {
    // WAL mode: writes are sequential appends, much faster for append-only workloads
    // synchronous=NORMAL: safe with WAL, faster than FULL
    // journal_size_limit: prevent WAL from growing indefinitely
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 1000;
        PRAGMA journal_size_limit = 67108864;

        CREATE TABLE IF NOT EXISTS audit_logs (
            id TEXT PRIMARY KEY,
            timestamp INTEGER NOT NULL,
            actor_type TEXT NOT NULL CHECK (actor_type IN ('admin', 'webhook', 'system')),
            actor_id TEXT,
            actor_name TEXT,
            action TEXT NOT NULL,
            resource_type TEXT NOT NULL,
            resource_id TEXT NOT NULL,
            resource_name TEXT,
            details TEXT,
            ip_address TEXT,
            user_agent TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_actor ON audit_logs(actor_id);
        CREATE INDEX IF NOT EXISTS idx_audit_logs_resource ON audit_logs(resource_type, resource_id);
        "#,
    )?;
    Ok(())
}
