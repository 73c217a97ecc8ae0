//! SQLite-based store implementation

use alic_util::{Fingerprint, InstallationId, LicenseKey, ProductId, SignatureId};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    CheckCommit, CommitOutcome, EntitlementStore, Installation, NewProduct, NewSignature, Product,
    Signature, SignatureRecord, StoreError, StoreResult,
};

/// SQLite-based store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!(path = %path.display(), "Entitlement store opened");
        Ok(store)
    }

    /// Create an in-memory store (for testing)
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Bound how long a call waits on a locked database
    pub fn with_busy_timeout(self, timeout: Duration) -> StoreResult<Self> {
        self.conn()?.busy_timeout(timeout)?;
        Ok(self)
    }

    fn conn(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn init_schema(&self) -> StoreResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS products (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                install_limit INTEGER,
                session_limit INTEGER,
                period_secs INTEGER,
                additional_content TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS signatures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                license_key TEXT NOT NULL UNIQUE,
                product_id INTEGER NOT NULL REFERENCES products(id),
                activation_date TEXT,
                additional_content TEXT NOT NULL DEFAULT '',
                comment TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS installations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                signature_id INTEGER NOT NULL REFERENCES signatures(id),
                fingerprint TEXT NOT NULL,
                UNIQUE (signature_id, fingerprint)
            );

            CREATE INDEX IF NOT EXISTS idx_signatures_product ON signatures(product_id);
            "#,
        )?;

        debug!("Store schema initialized");
        Ok(())
    }
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn period_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Duration>> {
    let secs: Option<i64> = row.get(idx)?;
    secs.map(|s| {
        u64::try_from(s)
            .map(Duration::from_secs)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Integer, Box::new(e)))
    })
    .transpose()
}

fn period_to_secs(period: Option<Duration>) -> Option<i64> {
    period.map(|p| i64::try_from(p.as_secs()).unwrap_or(i64::MAX))
}

const SIGNATURE_COLUMNS: &str =
    "id, license_key, product_id, activation_date, additional_content, comment";

fn signature_from_row(row: &Row<'_>) -> rusqlite::Result<Signature> {
    Ok(Signature {
        id: SignatureId::new(row.get(0)?),
        license_key: LicenseKey::new(row.get::<_, String>(1)?),
        product_id: ProductId::new(row.get(2)?),
        activation_date: timestamp_column(row, 3)?,
        additional_content: row.get(4)?,
        comment: row.get(5)?,
    })
}

const PRODUCT_COLUMNS: &str =
    "id, name, install_limit, session_limit, period_secs, additional_content";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: ProductId::new(row.get(0)?),
        name: row.get(1)?,
        install_limit: row.get(2)?,
        session_limit: row.get(3)?,
        period: period_column(row, 4)?,
        additional_content: row.get(5)?,
    })
}

fn load_installations(conn: &Connection, id: SignatureId) -> StoreResult<Vec<Installation>> {
    let mut stmt = conn.prepare(
        "SELECT id, fingerprint FROM installations WHERE signature_id = ? ORDER BY id",
    )?;

    let rows = stmt.query_map([id.get()], |row| {
        Ok(Installation {
            id: InstallationId::new(row.get(0)?),
            signature_id: id,
            fingerprint: Fingerprint::new(row.get::<_, String>(1)?),
        })
    })?;

    let mut installations = Vec::new();
    for row in rows {
        installations.push(row?);
    }
    Ok(installations)
}

impl EntitlementStore for SqliteStore {
    fn find_signature(&self, license_key: &LicenseKey) -> StoreResult<Option<SignatureRecord>> {
        let conn = self.conn()?;

        let signature = conn
            .query_row(
                &format!("SELECT {SIGNATURE_COLUMNS} FROM signatures WHERE license_key = ?"),
                [license_key.as_str()],
                signature_from_row,
            )
            .optional()?;

        let Some(signature) = signature else {
            return Ok(None);
        };

        let product = conn.query_row(
            &format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ?"),
            [signature.product_id.get()],
            product_from_row,
        )?;

        let installations = load_installations(&conn, signature.id)?;

        Ok(Some(SignatureRecord {
            signature,
            product,
            installations,
        }))
    }

    fn commit_check(&self, commit: &CheckCommit) -> StoreResult<CommitOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let signature_id = commit.signature_id.get();

        if let Some(fingerprint) = &commit.new_installation {
            let inserted = tx.execute(
                r#"
                INSERT OR IGNORE INTO installations (signature_id, fingerprint)
                SELECT ?1, ?2
                WHERE ?3 IS NULL
                   OR (SELECT COUNT(*) FROM installations WHERE signature_id = ?1) < ?3
                "#,
                params![signature_id, fingerprint.as_str(), commit.install_limit],
            )?;

            if inserted == 0 {
                let bound: Option<i64> = tx
                    .query_row(
                        "SELECT id FROM installations WHERE signature_id = ? AND fingerprint = ?",
                        params![signature_id, fingerprint.as_str()],
                        |row| row.get(0),
                    )
                    .optional()?;

                if bound.is_none() {
                    warn!(
                        signature_id,
                        "Installation slot taken concurrently, rolling back"
                    );
                    return Ok(CommitOutcome::InstallLimitReached);
                }
            } else {
                debug!(signature_id, "Installation added");
            }
        }

        if let Some(at) = commit.activate_at {
            let updated = tx.execute(
                "UPDATE signatures SET activation_date = ? WHERE id = ? AND activation_date IS NULL",
                params![format_timestamp(at), signature_id],
            )?;
            if updated > 0 {
                debug!(signature_id, activated_at = %at, "Signature activated");
            }
        }

        let activation_date = tx
            .query_row(
                "SELECT activation_date FROM signatures WHERE id = ?",
                [signature_id],
                |row| timestamp_column(row, 0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("signature {}", signature_id)))?;

        tx.commit()?;
        Ok(CommitOutcome::Committed { activation_date })
    }

    fn create_product(&self, product: &NewProduct) -> StoreResult<Product> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO products (name, install_limit, session_limit, period_secs, additional_content)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                product.name,
                product.install_limit,
                product.session_limit,
                period_to_secs(product.period),
                product.additional_content,
            ],
        )?;

        let id = ProductId::new(conn.last_insert_rowid());
        debug!(product_id = %id, name = %product.name, "Product created");

        Ok(Product {
            id,
            name: product.name.clone(),
            install_limit: product.install_limit,
            session_limit: product.session_limit,
            period: product.period,
            additional_content: product.additional_content.clone(),
        })
    }

    fn create_signature(&self, signature: &NewSignature) -> StoreResult<Signature> {
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO signatures (license_key, product_id, activation_date, additional_content, comment)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                signature.license_key.as_str(),
                signature.product_id.get(),
                signature.activation_date.map(format_timestamp),
                signature.additional_content,
                signature.comment,
            ],
        )?;

        let id = SignatureId::new(conn.last_insert_rowid());
        debug!(signature_id = %id, product_id = %signature.product_id, "Signature created");

        Ok(Signature {
            id,
            license_key: signature.license_key.clone(),
            product_id: signature.product_id,
            activation_date: signature.activation_date,
            additional_content: signature.additional_content.clone(),
            comment: signature.comment.clone(),
        })
    }

    fn get_signature(&self, id: SignatureId) -> StoreResult<Option<Signature>> {
        let conn = self.conn()?;

        let signature = conn
            .query_row(
                &format!("SELECT {SIGNATURE_COLUMNS} FROM signatures WHERE id = ?"),
                [id.get()],
                signature_from_row,
            )
            .optional()?;

        Ok(signature)
    }

    fn count_installations(&self, id: SignatureId) -> StoreResult<u64> {
        let conn = self.conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM installations WHERE signature_id = ?",
            [id.get()],
            |row| row.get(0),
        )?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    fn is_healthy(&self) -> bool {
        match self.conn.lock() {
            Ok(conn) => conn.query_row("SELECT 1", [], |_| Ok(())).is_ok(),
            Err(_) => {
                warn!("Store lock poisoned");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store_with_signature(product: NewProduct) -> (SqliteStore, Signature) {
        let store = SqliteStore::in_memory().unwrap();
        let product = store.create_product(&product).unwrap();
        let signature = store
            .create_signature(&NewSignature::new("KEY-1", product.id))
            .unwrap();
        (store, signature)
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_in_memory_store() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store.is_healthy());
    }

    #[test]
    fn test_find_signature_loads_product() {
        let (store, signature) = store_with_signature(
            NewProduct::new("Editor")
                .install_limit(2)
                .period(Duration::from_secs(86400))
                .additional_content("product-blob"),
        );

        let record = store
            .find_signature(&LicenseKey::new("KEY-1"))
            .unwrap()
            .unwrap();
        assert_eq!(record.signature, signature);
        assert_eq!(record.product.name, "Editor");
        assert_eq!(record.product.install_limit, Some(2));
        assert_eq!(record.product.session_limit, None);
        assert_eq!(record.product.period, Some(Duration::from_secs(86400)));
        assert_eq!(record.product.additional_content, "product-blob");
        assert!(record.installations.is_empty());
    }

    #[test]
    fn test_unknown_key() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(store
            .find_signature(&LicenseKey::new("nope"))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_duplicate_license_key_rejected() {
        let (store, signature) = store_with_signature(NewProduct::new("Editor"));
        let result = store.create_signature(&NewSignature::new("KEY-1", signature.product_id));
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[test]
    fn test_activation_is_set_once() {
        let (store, signature) = store_with_signature(NewProduct::new("Editor"));

        let first = store
            .commit_check(&CheckCommit {
                signature_id: signature.id,
                activate_at: Some(at(10, 0, 0)),
                new_installation: None,
                install_limit: None,
            })
            .unwrap();
        assert_eq!(
            first,
            CommitOutcome::Committed {
                activation_date: Some(at(10, 0, 0))
            }
        );

        // A racing check that also saw a null activation keeps the first date
        let second = store
            .commit_check(&CheckCommit {
                signature_id: signature.id,
                activate_at: Some(at(11, 0, 0)),
                new_installation: None,
                install_limit: None,
            })
            .unwrap();
        assert_eq!(
            second,
            CommitOutcome::Committed {
                activation_date: Some(at(10, 0, 0))
            }
        );

        let stored = store.get_signature(signature.id).unwrap().unwrap();
        assert_eq!(stored.activation_date, Some(at(10, 0, 0)));
    }

    #[test]
    fn test_installation_is_unique_per_fingerprint() {
        let (store, signature) = store_with_signature(NewProduct::new("Editor"));
        let commit = CheckCommit {
            signature_id: signature.id,
            activate_at: None,
            new_installation: Some(Fingerprint::new("machine-a")),
            install_limit: None,
        };

        store.commit_check(&commit).unwrap();
        store.commit_check(&commit).unwrap();

        assert_eq!(store.count_installations(signature.id).unwrap(), 1);
        let record = store
            .find_signature(&LicenseKey::new("KEY-1"))
            .unwrap()
            .unwrap();
        assert!(record
            .installation_for(&Fingerprint::new("machine-a"))
            .is_some());
    }

    #[test]
    fn test_install_limit_rechecked_in_transaction() {
        let (store, signature) = store_with_signature(NewProduct::new("Editor").install_limit(1));

        let first = store
            .commit_check(&CheckCommit {
                signature_id: signature.id,
                activate_at: Some(at(10, 0, 0)),
                new_installation: Some(Fingerprint::new("machine-a")),
                install_limit: Some(1),
            })
            .unwrap();
        assert!(matches!(first, CommitOutcome::Committed { .. }));

        let second = store
            .commit_check(&CheckCommit {
                signature_id: signature.id,
                activate_at: None,
                new_installation: Some(Fingerprint::new("machine-b")),
                install_limit: Some(1),
            })
            .unwrap();
        assert_eq!(second, CommitOutcome::InstallLimitReached);
        assert_eq!(store.count_installations(signature.id).unwrap(), 1);

        // The bound fingerprint is still accepted at the limit
        let again = store
            .commit_check(&CheckCommit {
                signature_id: signature.id,
                activate_at: None,
                new_installation: Some(Fingerprint::new("machine-a")),
                install_limit: Some(1),
            })
            .unwrap();
        assert!(matches!(again, CommitOutcome::Committed { .. }));
    }

    #[test]
    fn test_rejected_commit_leaves_activation_unset() {
        let (store, signature) = store_with_signature(NewProduct::new("Editor").install_limit(0));

        let outcome = store
            .commit_check(&CheckCommit {
                signature_id: signature.id,
                activate_at: Some(at(10, 0, 0)),
                new_installation: Some(Fingerprint::new("machine-a")),
                install_limit: Some(0),
            })
            .unwrap();
        assert_eq!(outcome, CommitOutcome::InstallLimitReached);

        let stored = store.get_signature(signature.id).unwrap().unwrap();
        assert!(stored.activation_date.is_none());
    }

    #[test]
    fn test_commit_for_missing_signature() {
        let store = SqliteStore::in_memory().unwrap();
        let result = store.commit_check(&CheckCommit {
            signature_id: SignatureId::new(999),
            activate_at: Some(at(10, 0, 0)),
            new_installation: None,
            install_limit: None,
        });
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_pre_activated_signature() {
        let store = SqliteStore::in_memory().unwrap();
        let product = store.create_product(&NewProduct::new("Editor")).unwrap();
        let signature = store
            .create_signature(
                &NewSignature::new("KEY-2", product.id)
                    .comment("reseller batch")
                    .activated_at(at(9, 30, 0)),
            )
            .unwrap();

        let stored = store.get_signature(signature.id).unwrap().unwrap();
        assert_eq!(stored.activation_date, Some(at(9, 30, 0)));
        assert_eq!(stored.comment, "reseller batch");
    }

    #[test]
    fn test_reopen_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("entitlements.db");

        {
            let store = SqliteStore::open(&path)
                .unwrap()
                .with_busy_timeout(Duration::from_millis(500))
                .unwrap();
            let product = store.create_product(&NewProduct::new("Editor")).unwrap();
            store
                .create_signature(&NewSignature::new("KEY-1", product.id))
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store
            .find_signature(&LicenseKey::new("KEY-1"))
            .unwrap()
            .is_some());
    }
}
