pub mod address;
pub mod connection;
pub mod cursor;
pub mod transaction;

pub const INIT_SCHEMA: &str = r#"
-- Tracked addresses, unique per network
CREATE TABLE IF NOT EXISTS addresses (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,
    net TEXT NOT NULL,
    currency TEXT NOT NULL,
    is_service INTEGER NOT NULL DEFAULT 0,
    is_exchange INTEGER NOT NULL DEFAULT 0,
    created INTEGER NOT NULL,
    updated INTEGER,
    UNIQUE (net, address)
);

-- Opaque user identifiers attached to an address
CREATE TABLE IF NOT EXISTS address_users (
    address_id INTEGER NOT NULL,
    user_id TEXT NOT NULL,
    PRIMARY KEY (address_id, user_id),
    FOREIGN KEY (address_id) REFERENCES addresses(id) ON DELETE CASCADE
);

-- Ledger rows. address_id is set in per-address mode and NULL in chain-wide mode.
-- currency is the asset the row moves; it equals net unless the adapter overrides it.
CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address_id INTEGER,
    net TEXT NOT NULL,
    currency TEXT NOT NULL,
    hash TEXT NOT NULL,
    date INTEGER NOT NULL,
    value REAL NOT NULL,
    from_address TEXT NOT NULL,
    from_alias TEXT,
    to_address TEXT NOT NULL,
    fee REAL NOT NULL DEFAULT 0,
    type TEXT NOT NULL,
    original_op_type TEXT NOT NULL,
    comment TEXT,
    path TEXT,
    is_cancelled INTEGER NOT NULL DEFAULT 0
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_hash_address
    ON transactions(hash, address_id) WHERE address_id IS NOT NULL;
CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_hash_currency
    ON transactions(hash, currency) WHERE address_id IS NULL;
CREATE INDEX IF NOT EXISTS idx_transactions_address_op ON transactions(address_id, original_op_type);
CREATE INDEX IF NOT EXISTS idx_transactions_net_from ON transactions(net, from_address, date);
CREATE INDEX IF NOT EXISTS idx_transactions_net_to ON transactions(net, to_address, date);
CREATE INDEX IF NOT EXISTS idx_addresses_net_updated ON addresses(net, updated);
"#;
