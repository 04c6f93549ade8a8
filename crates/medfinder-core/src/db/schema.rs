//! SQLite schema definition.

/// Complete database schema for medfinder.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Organizations
-- ============================================================================

CREATE TABLE IF NOT EXISTS organizations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_name TEXT NOT NULL,
    contact_name TEXT NOT NULL DEFAULT '',
    phone TEXT NOT NULL DEFAULT '',
    website TEXT NOT NULL DEFAULT '',
    registration_date TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))
);

-- ============================================================================
-- Geography
-- ============================================================================

CREATE TABLE IF NOT EXISTS states (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    state_code TEXT NOT NULL,
    state_name TEXT NOT NULL DEFAULT '',
    state_us_id INTEGER UNIQUE,
    population INTEGER,
    geometry TEXT,                               -- GeoJSON geometry
    active_provider_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_states_code ON states(state_code);

CREATE TABLE IF NOT EXISTS counties (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    county_name TEXT NOT NULL DEFAULT '',
    county_name_slug TEXT NOT NULL DEFAULT '',
    state_id INTEGER NOT NULL REFERENCES states(id) ON DELETE CASCADE,
    county_id INTEGER,
    geo_id INTEGER,
    population INTEGER,
    geometry TEXT,
    active_provider_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_counties_state ON counties(state_id);

CREATE TABLE IF NOT EXISTS zipcodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    zipcode TEXT NOT NULL,
    state_id INTEGER NOT NULL REFERENCES states(id) ON DELETE CASCADE,
    population INTEGER,
    geometry TEXT,
    active_provider_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_zipcodes_zipcode ON zipcodes(zipcode);
CREATE INDEX IF NOT EXISTS idx_zipcodes_state ON zipcodes(state_id);

CREATE TABLE IF NOT EXISTS zipcode_counties (
    zipcode_id INTEGER NOT NULL REFERENCES zipcodes(id) ON DELETE CASCADE,
    county_id INTEGER NOT NULL REFERENCES counties(id) ON DELETE CASCADE,
    PRIMARY KEY (zipcode_id, county_id)
);

CREATE INDEX IF NOT EXISTS idx_zipcode_counties_county ON zipcode_counties(county_id);

-- ============================================================================
-- Providers
-- ============================================================================

CREATE TABLE IF NOT EXISTS provider_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL DEFAULT '00' CHECK (length(code) <= 2),
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS provider_categories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL DEFAULT '00' CHECK (length(code) <= 2),
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS providers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    organization_id INTEGER REFERENCES organizations(id) ON DELETE SET NULL,
    store_number INTEGER NOT NULL DEFAULT 0,
    name TEXT NOT NULL DEFAULT '',
    type_id INTEGER REFERENCES provider_types(id) ON DELETE SET NULL,
    category_id INTEGER REFERENCES provider_categories(id) ON DELETE SET NULL,
    address TEXT NOT NULL,
    city TEXT NOT NULL,
    state TEXT NOT NULL,
    zip TEXT NOT NULL,
    related_zipcode_id INTEGER REFERENCES zipcodes(id) ON DELETE SET NULL,
    phone TEXT NOT NULL DEFAULT '',
    website TEXT NOT NULL DEFAULT '',
    email TEXT UNIQUE,                           -- NULL allowed, unique when set
    operating_hours TEXT NOT NULL DEFAULT '',
    notes TEXT NOT NULL DEFAULT '',
    insurance_accepted INTEGER NOT NULL DEFAULT 0,
    walkins_accepted INTEGER,                    -- NULL means unknown
    home_delivery INTEGER NOT NULL DEFAULT 0,
    home_delivery_info_url TEXT NOT NULL DEFAULT '',
    lat REAL,
    lng REAL,
    start_date TEXT,
    end_date TEXT,
    last_import_date TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1
);

CREATE INDEX IF NOT EXISTS idx_providers_org_store ON providers(organization_id, store_number);
CREATE INDEX IF NOT EXISTS idx_providers_zipcode ON providers(related_zipcode_id);
CREATE INDEX IF NOT EXISTS idx_providers_location ON providers(lat, lng);

-- ============================================================================
-- Medications
-- ============================================================================

CREATE TABLE IF NOT EXISTS medication_names (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS medications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    medication_name_id INTEGER REFERENCES medication_names(id) ON DELETE CASCADE,
    drug_type TEXT NOT NULL DEFAULT 'b' CHECK (drug_type IN ('b', 'g', 'p'))
);

CREATE INDEX IF NOT EXISTS idx_medications_name ON medications(medication_name_id);

CREATE TABLE IF NOT EXISTS medication_ndcs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    medication_id INTEGER REFERENCES medications(id) ON DELETE CASCADE,
    ndc TEXT NOT NULL UNIQUE
);

-- ============================================================================
-- Supply Reports (provider x NDC x time)
-- ============================================================================

CREATE TABLE IF NOT EXISTS supply_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider_id INTEGER NOT NULL REFERENCES providers(id) ON DELETE CASCADE,
    medication_ndc_id INTEGER NOT NULL REFERENCES medication_ndcs(id) ON DELETE CASCADE,
    supply TEXT NOT NULL DEFAULT '',
    level INTEGER NOT NULL DEFAULT 0 CHECK (level BETWEEN 0 AND 4),
    creation_date TEXT NOT NULL,
    last_modified TEXT NOT NULL,
    latest INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_supply_pair_latest ON supply_reports(provider_id, medication_ndc_id, latest);
CREATE INDEX IF NOT EXISTS idx_supply_creation ON supply_reports(creation_date);

-- ============================================================================
-- Users
-- ============================================================================

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    first_name TEXT NOT NULL DEFAULT '',
    last_name TEXT NOT NULL DEFAULT '',
    organization_id INTEGER REFERENCES organizations(id) ON DELETE SET NULL,
    role TEXT NOT NULL DEFAULT '',
    permission_level TEXT NOT NULL DEFAULT 'sl' CHECK (permission_level IN ('nl', 'sl')),
    state_id INTEGER REFERENCES states(id) ON DELETE SET NULL,
    is_active INTEGER NOT NULL DEFAULT 1,
    date_joined TEXT NOT NULL
);

-- ============================================================================
-- Epidemic flag (single row)
-- ============================================================================

CREATE TABLE IF NOT EXISTS epidemic (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    active INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO epidemic (id, active) VALUES (1, 0);

-- ============================================================================
-- Export files
-- ============================================================================

CREATE TABLE IF NOT EXISTS export_files (
    id TEXT PRIMARY KEY,
    path TEXT NOT NULL,
    sha256 TEXT NOT NULL,
    row_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_export_files_expires ON export_files(expires_at);
"#;
