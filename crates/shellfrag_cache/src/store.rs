//! Persistent SQLite store shared by every shell session on the host.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use rusqlite::{Connection, ErrorCode, OptionalExtension, TransactionBehavior, params};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{CacheEntry, CacheError, CacheKey, ParsingMode};

/// Environment variable overriding the store location.
pub const STORE_PATH_ENV: &str = "SHELLFRAG_CACHE_PATH";

const APP_DIR: &str = "shellfrag";
const STORE_FILE: &str = "fragment-cache.db";

/// Bumped whenever the table layout or the `commands` encoding changes.
const SCHEMA_VERSION: i32 = 1;

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);
const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(25);

/// Which part of the cache a clear operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearScope {
    All,
    #[serde(rename = "ast")]
    AstOnly,
    #[serde(rename = "regex")]
    RegexOnly,
}

impl ClearScope {
    /// Parsing modes covered by this scope.
    pub fn modes(&self) -> &'static [ParsingMode] {
        match self {
            ClearScope::All => &ParsingMode::ALL,
            ClearScope::AstOnly => &[ParsingMode::Ast],
            ClearScope::RegexOnly => &[ParsingMode::Regex],
        }
    }
}

/// What a store clear removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreClearOutcome {
    pub rows_removed: usize,
    pub bytes_removed: u64,
    pub file_removed: bool,
}

/// Resolves the store location.
///
/// Search order:
/// 1. `$SHELLFRAG_CACHE_PATH`
/// 2. `config_override` (the `store_path` config value)
/// 3. `<local data dir>/shellfrag/fragment-cache.db`
/// 4. `$HOME/.cache/shellfrag/fragment-cache.db`
pub fn resolve_store_path(config_override: Option<&Path>) -> Result<PathBuf, CacheError> {
    let env_override = std::env::var_os(STORE_PATH_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from);

    resolve_store_path_from(
        env_override,
        config_override.map(Path::to_path_buf),
        dirs::data_local_dir(),
        dirs::home_dir(),
    )
}

fn resolve_store_path_from(
    env_override: Option<PathBuf>,
    config_override: Option<PathBuf>,
    local_data_dir: Option<PathBuf>,
    home_dir: Option<PathBuf>,
) -> Result<PathBuf, CacheError> {
    if let Some(path) = env_override {
        debug!("Using store path from {}", STORE_PATH_ENV);
        return Ok(path);
    }

    if let Some(path) = config_override {
        return Ok(path);
    }

    if let Some(dir) = local_data_dir {
        return Ok(dir.join(APP_DIR).join(STORE_FILE));
    }

    if let Some(home) = home_dir {
        return Ok(home.join(".cache").join(APP_DIR).join(STORE_FILE));
    }

    Err(CacheError::configuration(
        "cannot determine a cache directory (no override, data directory or home directory)",
    ))
}

/// SQLite-backed store of cache entries.
///
/// One table per parsing mode, keyed by `(file_path, last_write_ticks,
/// parsing_mode)`. The connection is opened lazily on first use.
pub struct FragmentStore {
    path: PathBuf,
    conn: Option<Connection>,
}

impl FragmentStore {
    /// Creates a store handle for the given file. Nothing is opened yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            conn: None,
        }
    }

    /// Returns the store file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Probes whether the SQLite engine can be used on this host.
    pub fn is_available() -> bool {
        Self::engine_version().is_some()
    }

    /// Returns the SQLite engine version, if the engine works.
    pub fn engine_version() -> Option<String> {
        Connection::open_in_memory()
            .and_then(|conn| conn.query_row("SELECT sqlite_version()", [], |row| row.get(0)))
            .ok()
    }

    /// Returns true if the store file exists.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Returns the on-disk size of the store, including its WAL file.
    pub fn file_size(&self) -> u64 {
        self.companion_files()
            .iter()
            .filter_map(|path| fs::metadata(path).ok())
            .map(|metadata| metadata.len())
            .sum()
    }

    fn companion_files(&self) -> Vec<PathBuf> {
        let mut files = vec![self.path.clone()];
        for suffix in ["-wal", "-shm"] {
            let mut name = self.path.as_os_str().to_os_string();
            name.push(suffix);
            files.push(PathBuf::from(name));
        }
        files
    }

    fn connection(&mut self) -> Result<&mut Connection, CacheError> {
        if self.conn.is_none() {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)?;
            }

            let conn = Connection::open(&self.path)
                .map_err(|e| CacheError::unavailable(format!("{}: {}", self.path.display(), e)))?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            if let Err(e) = conn.execute_batch("PRAGMA journal_mode=WAL;") {
                debug!("Could not enable WAL for {}: {}", self.path.display(), e);
            }

            debug!("Opened cache store at {}", self.path.display());
            self.conn = Some(conn);
        }

        self.conn
            .as_mut()
            .ok_or_else(|| CacheError::unavailable("connection not open"))
    }

    /// Closes the connection, if open.
    pub fn close(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err((_, e)) = conn.close()
        {
            debug!("Error closing cache store: {}", e);
        }
    }

    /// Creates both tables if absent.
    ///
    /// Runs inside an immediate transaction so concurrent shells starting at
    /// once serialize on the store lock. A store written with a different
    /// schema version is emptied.
    pub fn ensure_schema(&mut self) -> Result<(), CacheError> {
        let conn = self.connection()?;
        with_retry(|| migrate(conn)).map_err(|e| CacheError::schema(e.to_string()))
    }

    /// Looks up an exact key.
    ///
    /// Every failure is reported as a miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        match self.try_get(key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Cache read failed for {}: {}", key.file_path, e);
                None
            }
        }
    }

    /// Looks up an exact key, surfacing errors.
    pub fn try_get(&mut self, key: &CacheKey) -> Result<Option<CacheEntry>, CacheError> {
        let sql = format!(
            "SELECT commands, created_at_ticks FROM {} \
             WHERE file_path = ?1 AND last_write_ticks = ?2 AND parsing_mode = ?3",
            key.mode.table_name()
        );

        let conn = self.connection()?;
        let row = conn
            .prepare_cached(&sql)
            .and_then(|mut stmt| {
                stmt.query_row(
                    params![key.file_path, key.last_write_ticks, key.mode.as_str()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
                )
                .optional()
            })
            .map_err(|e| CacheError::read(e.to_string()))?;

        match row {
            Some((raw, created_at_ticks)) => {
                let names = CacheEntry::decode_commands(&raw)?;
                Ok(Some(CacheEntry::with_created_at(
                    key.clone(),
                    names,
                    created_at_ticks,
                )))
            }
            None => Ok(None),
        }
    }

    /// Upserts an entry.
    ///
    /// Write failures are logged and dropped; returns whether the row was written.
    pub fn put(&mut self, entry: &CacheEntry) -> bool {
        match self.try_put(entry) {
            Ok(()) => true,
            Err(e) => {
                warn!("Cache write failed for {}: {}", entry.key().file_path, e);
                false
            }
        }
    }

    /// Upserts an entry, surfacing errors.
    ///
    /// Lock contention from other sessions is retried a few times before
    /// giving up.
    pub fn try_put(&mut self, entry: &CacheEntry) -> Result<(), CacheError> {
        let key = entry.key();
        let commands = entry.encode_commands()?;
        let sql = format!(
            "INSERT INTO {} (file_path, last_write_ticks, parsing_mode, commands, created_at_ticks) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(file_path, last_write_ticks, parsing_mode) \
             DO UPDATE SET commands = excluded.commands, created_at_ticks = excluded.created_at_ticks",
            key.mode.table_name()
        );

        let conn = self.connection()?;
        with_retry(|| {
            conn.prepare_cached(&sql)?.execute(params![
                key.file_path,
                key.last_write_ticks,
                key.mode.as_str(),
                commands,
                entry.created_at_ticks(),
            ])
        })
        .map(|_| ())
        .map_err(|e| CacheError::write(e.to_string()))
    }

    /// Counts the rows held for a mode. A missing store counts as empty.
    pub fn count_entries(&mut self, mode: ParsingMode) -> Result<usize, CacheError> {
        if !self.exists() {
            return Ok(0);
        }

        let conn = self.connection()?;
        if !table_exists(conn, mode.table_name())? {
            return Ok(0);
        }

        let count: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", mode.table_name()),
                [],
                |row| row.get(0),
            )
            .map_err(|e| CacheError::read(e.to_string()))?;

        Ok(count as usize)
    }

    /// Reads every row held for a mode. Rows that fail to decode are skipped.
    pub fn load_all(&mut self, mode: ParsingMode) -> Result<Vec<CacheEntry>, CacheError> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let conn = self.connection()?;
        if !table_exists(conn, mode.table_name())? {
            return Ok(Vec::new());
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT file_path, last_write_ticks, commands, created_at_ticks FROM {}",
            mode.table_name()
        ))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            })
            .map_err(|e| CacheError::read(e.to_string()))?;

        let mut entries = Vec::new();
        for row in rows {
            let (file_path, ticks, raw, created_at_ticks) =
                row.map_err(|e| CacheError::read(e.to_string()))?;
            match CacheEntry::decode_commands(&raw) {
                Ok(names) => entries.push(CacheEntry::with_created_at(
                    CacheKey::from_normalized(file_path, ticks, mode),
                    names,
                    created_at_ticks,
                )),
                Err(e) => warn!("Skipping undecodable {} entry for {}: {}", mode, file_path, e),
            }
        }

        Ok(entries)
    }

    /// Deletes rows superseded by a newer timestamp for the same path.
    pub fn purge_stale(&mut self, mode: ParsingMode) -> Result<usize, CacheError> {
        if !self.exists() {
            return Ok(0);
        }

        let table = mode.table_name();
        let conn = self.connection()?;
        if !table_exists(conn, table)? {
            return Ok(0);
        }

        let sql = format!(
            "DELETE FROM {table} WHERE rowid IN (\
                SELECT old.rowid FROM {table} AS old \
                JOIN {table} AS newer \
                  ON newer.file_path = old.file_path \
                 AND newer.last_write_ticks > old.last_write_ticks)"
        );
        let removed =
            with_retry(|| conn.execute(&sql, [])).map_err(|e| CacheError::write(e.to_string()))?;

        debug!("Purged {} stale {} entries", removed, mode);
        Ok(removed)
    }

    /// Deletes the rows in scope.
    ///
    /// With `ClearScope::All` and `remove_file`, the store file (and its WAL
    /// companions) is deleted instead.
    pub fn clear(
        &mut self,
        scope: ClearScope,
        remove_file: bool,
    ) -> Result<StoreClearOutcome, CacheError> {
        if !self.exists() {
            return Ok(StoreClearOutcome::default());
        }

        if remove_file && scope == ClearScope::All {
            return self.remove_file();
        }

        let size_before = self.file_size();
        let conn = self.connection()?;

        let mut rows_removed = 0;
        for mode in scope.modes() {
            let table = mode.table_name();
            if !table_exists(conn, table)? {
                continue;
            }
            rows_removed += with_retry(|| conn.execute(&format!("DELETE FROM {}", table), []))
                .map_err(|e| CacheError::write(e.to_string()))?;
        }

        if rows_removed > 0 {
            let compacted = conn
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .and_then(|_| conn.execute_batch("VACUUM"));
            if let Err(e) = compacted {
                debug!("Skipped compacting {}: {}", self.path.display(), e);
            }
        }

        let bytes_removed = size_before.saturating_sub(self.file_size());
        info!(
            "Cleared {} rows ({} bytes) from {}",
            rows_removed,
            bytes_removed,
            self.path.display()
        );

        Ok(StoreClearOutcome {
            rows_removed,
            bytes_removed,
            file_removed: false,
        })
    }

    fn remove_file(&mut self) -> Result<StoreClearOutcome, CacheError> {
        let mut rows_removed = 0;
        for mode in ParsingMode::ALL {
            rows_removed += self.count_entries(mode).unwrap_or(0);
        }
        let bytes_removed = self.file_size();

        self.close();
        for file in self.companion_files() {
            match fs::remove_file(&file) {
                Ok(()) => debug!("Removed {}", file.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(CacheError::write(format!("{}: {}", file.display(), e))),
            }
        }

        info!(
            "Removed cache store {} ({} bytes)",
            self.path.display(),
            bytes_removed
        );

        Ok(StoreClearOutcome {
            rows_removed,
            bytes_removed,
            file_removed: true,
        })
    }
}

impl std::fmt::Debug for FragmentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FragmentStore")
            .field("path", &self.path)
            .field("open", &self.conn.is_some())
            .finish()
    }
}

fn migrate(conn: &mut Connection) -> rusqlite::Result<()> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let version: i32 = tx.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version != 0 && version != SCHEMA_VERSION {
        info!(
            "Cache store schema version {} does not match {}, rebuilding",
            version, SCHEMA_VERSION
        );
        for mode in ParsingMode::ALL {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {};", mode.table_name()))?;
        }
    }

    for mode in ParsingMode::ALL {
        tx.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (
                file_path TEXT NOT NULL,
                last_write_ticks INTEGER NOT NULL,
                parsing_mode TEXT NOT NULL,
                commands TEXT NOT NULL,
                created_at_ticks INTEGER NOT NULL,
                PRIMARY KEY (file_path, last_write_ticks, parsing_mode)
            );",
            mode.table_name()
        ))?;
    }

    tx.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    tx.commit()
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool, CacheError> {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |_| Ok(()),
    )
    .optional()
    .map(|found| found.is_some())
    .map_err(|e| CacheError::read(e.to_string()))
}

fn is_contention(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

fn with_retry<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> rusqlite::Result<T> {
    let mut attempt = 1;
    loop {
        match op() {
            Err(e) if attempt < WRITE_ATTEMPTS && is_contention(&e) => {
                debug!("Cache store busy (attempt {}), retrying", attempt);
                thread::sleep(WRITE_BACKOFF * attempt);
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use tempfile::tempdir;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|n| n.to_string()).collect()
    }

    fn entry(path: &str, ticks: i64, mode: ParsingMode, list: &[&str]) -> CacheEntry {
        CacheEntry::new(
            CacheKey::from_normalized(path.to_string(), ticks, mode),
            names(list),
        )
    }

    fn open_store(dir: &Path) -> FragmentStore {
        let mut store = FragmentStore::new(dir.join("cache").join("fragments.db"));
        store.ensure_schema().unwrap();
        store
    }

    #[test]
    fn test_engine_is_available() {
        assert!(FragmentStore::is_available());
        assert!(FragmentStore::engine_version().is_some());
    }

    #[test]
    fn test_new_does_not_create_file() {
        let dir = tempdir().unwrap();
        let store = FragmentStore::new(dir.path().join("fragments.db"));
        assert!(!store.exists());
        assert_eq!(store.file_size(), 0);
    }

    #[test]
    fn test_ensure_schema_creates_file_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());

        assert!(store.exists());
        store.ensure_schema().unwrap();
        assert_eq!(store.count_entries(ParsingMode::Ast).unwrap(), 0);
        assert_eq!(store.count_entries(ParsingMode::Regex).unwrap(), 0);
    }

    #[test]
    fn test_put_get_roundtrip() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        let e = entry("/p/00-bootstrap.ps1", 42, ParsingMode::Ast, &["Set-Foo", "Get-Bar"]);

        assert!(store.put(&e));

        let found = store.get(e.key()).unwrap();
        assert_eq!(found, e);
    }

    #[test]
    fn test_get_from_fresh_handle() {
        let dir = tempdir().unwrap();
        let e = entry("/p/a.ps1", 7, ParsingMode::Regex, &["z", "a", "m"]);
        {
            let mut writer = open_store(dir.path());
            assert!(writer.put(&e));
        }

        let mut reader = FragmentStore::new(dir.path().join("cache").join("fragments.db"));
        assert_eq!(reader.get(e.key()).unwrap().command_names(), e.command_names());
    }

    #[test]
    fn test_modes_are_isolated() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        let e = entry("/p/a.ps1", 1, ParsingMode::Ast, &["Set-Foo"]);
        store.put(&e);

        assert!(store.get(&e.key().with_mode(ParsingMode::Regex)).is_none());
        assert_eq!(store.count_entries(ParsingMode::Ast).unwrap(), 1);
        assert_eq!(store.count_entries(ParsingMode::Regex).unwrap(), 0);
    }

    #[test]
    fn test_newer_timestamp_misses() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["Set-Foo"]));

        let newer = CacheKey::from_normalized("/p/a.ps1".to_string(), 2, ParsingMode::Ast);
        assert!(store.get(&newer).is_none());
    }

    #[test]
    fn test_put_replaces_same_key() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["Old"]));
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["New"]));

        let key = CacheKey::from_normalized("/p/a.ps1".to_string(), 1, ParsingMode::Ast);
        assert_eq!(store.get(&key).unwrap().command_names(), names(&["New"]));
        assert_eq!(store.count_entries(ParsingMode::Ast).unwrap(), 1);
    }

    #[test]
    fn test_get_on_corrupt_row_is_miss() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        let conn = Connection::open(store.path()).unwrap();
        conn.execute(
            "INSERT INTO fragment_ast_cache VALUES ('/p/a.ps1', 1, 'ast', 'not json', 0)",
            [],
        )
        .unwrap();

        let key = CacheKey::from_normalized("/p/a.ps1".to_string(), 1, ParsingMode::Ast);
        assert!(store.get(&key).is_none());
        assert!(matches!(
            store.try_get(&key),
            Err(CacheError::Serialization(_))
        ));
    }

    #[test]
    fn test_get_without_schema_is_miss() {
        let dir = tempdir().unwrap();
        let mut store = FragmentStore::new(dir.path().join("fragments.db"));
        let key = CacheKey::from_normalized("/p/a.ps1".to_string(), 1, ParsingMode::Ast);

        assert!(store.get(&key).is_none());
    }

    #[test]
    fn test_put_without_schema_fails_quietly() {
        let dir = tempdir().unwrap();
        let mut store = FragmentStore::new(dir.path().join("fragments.db"));

        assert!(!store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &[])));
    }

    #[rstest]
    #[case(ClearScope::All, 0, 0)]
    #[case(ClearScope::AstOnly, 0, 2)]
    #[case(ClearScope::RegexOnly, 1, 0)]
    fn test_clear_scope(
        #[case] scope: ClearScope,
        #[case] ast_left: usize,
        #[case] regex_left: usize,
    ) {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["A"]));
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Regex, &["A"]));
        store.put(&entry("/p/b.ps1", 1, ParsingMode::Regex, &["B"]));

        let outcome = store.clear(scope, false).unwrap();

        assert_eq!(outcome.rows_removed, 3 - ast_left - regex_left);
        assert!(!outcome.file_removed);
        assert_eq!(store.count_entries(ParsingMode::Ast).unwrap(), ast_left);
        assert_eq!(store.count_entries(ParsingMode::Regex).unwrap(), regex_left);
    }

    #[test]
    fn test_clear_remove_file() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["A"]));
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Regex, &["A"]));

        let outcome = store.clear(ClearScope::All, true).unwrap();

        assert!(outcome.file_removed);
        assert_eq!(outcome.rows_removed, 2);
        assert!(outcome.bytes_removed > 0);
        assert!(!store.exists());
        assert_eq!(store.count_entries(ParsingMode::Ast).unwrap(), 0);
    }

    #[test]
    fn test_store_usable_after_file_removed() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.clear(ClearScope::All, true).unwrap();

        store.ensure_schema().unwrap();
        let e = entry("/p/a.ps1", 1, ParsingMode::Ast, &["A"]);
        assert!(store.put(&e));
        assert!(store.get(e.key()).is_some());
    }

    #[test]
    fn test_remove_file_ignored_for_partial_scope() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["A"]));

        let outcome = store.clear(ClearScope::AstOnly, true).unwrap();
        assert!(!outcome.file_removed);
        assert!(store.exists());
    }

    #[test]
    fn test_clear_missing_store() {
        let dir = tempdir().unwrap();
        let mut store = FragmentStore::new(dir.path().join("absent.db"));

        assert_eq!(
            store.clear(ClearScope::All, true).unwrap(),
            StoreClearOutcome::default()
        );
        assert!(!store.exists());
    }

    #[test]
    fn test_count_entries_does_not_create_store() {
        let dir = tempdir().unwrap();
        let mut store = FragmentStore::new(dir.path().join("absent.db"));

        assert_eq!(store.count_entries(ParsingMode::Ast).unwrap(), 0);
        assert!(!store.exists());
    }

    #[test]
    fn test_load_all() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["A"]));
        store.put(&entry("/p/b.ps1", 2, ParsingMode::Ast, &["B"]));
        store.put(&entry("/p/b.ps1", 2, ParsingMode::Regex, &["B"]));

        let mut loaded = store.load_all(ParsingMode::Ast).unwrap();
        loaded.sort_by(|a, b| a.key().file_path.cmp(&b.key().file_path));

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].key().last_write_ticks, 2);
        assert_eq!(loaded[1].command_names(), names(&["B"]));
    }

    #[test]
    fn test_purge_stale_keeps_newest() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());
        store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["Old"]));
        store.put(&entry("/p/a.ps1", 3, ParsingMode::Ast, &["New"]));
        store.put(&entry("/p/a.ps1", 2, ParsingMode::Ast, &["Mid"]));
        store.put(&entry("/p/b.ps1", 1, ParsingMode::Ast, &["B"]));

        assert_eq!(store.purge_stale(ParsingMode::Ast).unwrap(), 2);

        let newest = CacheKey::from_normalized("/p/a.ps1".to_string(), 3, ParsingMode::Ast);
        assert!(store.get(&newest).is_some());
        assert_eq!(store.count_entries(ParsingMode::Ast).unwrap(), 2);
    }

    #[test]
    fn test_schema_version_mismatch_rebuilds() {
        let dir = tempdir().unwrap();
        let path = {
            let mut store = open_store(dir.path());
            store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["A"]));
            store.path().to_path_buf()
        };

        let conn = Connection::open(&path).unwrap();
        conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        drop(conn);

        let mut store = FragmentStore::new(&path);
        store.ensure_schema().unwrap();
        assert_eq!(store.count_entries(ParsingMode::Ast).unwrap(), 0);
    }

    #[test]
    fn test_two_handles_interleave_writes() {
        let dir = tempdir().unwrap();
        let mut first = open_store(dir.path());
        let mut second = open_store(dir.path());

        for i in 0..10 {
            let path = format!("/p/{}.ps1", i);
            let store = if i % 2 == 0 { &mut first } else { &mut second };
            assert!(store.put(&entry(&path, 1, ParsingMode::Regex, &["X"])));
        }

        assert_eq!(first.count_entries(ParsingMode::Regex).unwrap(), 10);
        assert_eq!(second.count_entries(ParsingMode::Regex).unwrap(), 10);
    }

    /// Holds the write lock on `path` from another connection for `hold`.
    fn hold_write_lock(path: PathBuf, hold: Duration) -> thread::JoinHandle<()> {
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let handle = thread::spawn(move || {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("BEGIN IMMEDIATE;").unwrap();
            ready_tx.send(()).unwrap();
            thread::sleep(hold);
            conn.execute_batch("COMMIT;").unwrap();
        });
        ready_rx.recv().unwrap();
        handle
    }

    #[test]
    fn test_put_waits_out_short_lock() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());

        let holder = hold_write_lock(store.path().to_path_buf(), Duration::from_millis(400));
        assert!(store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["Set-Foo"])));
        holder.join().unwrap();

        let key = CacheKey::from_normalized("/p/a.ps1".to_string(), 1, ParsingMode::Ast);
        assert_eq!(store.get(&key).unwrap().command_names(), &names(&["Set-Foo"])[..]);
    }

    #[test]
    fn test_put_gives_up_after_retries() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path());

        let holder = hold_write_lock(store.path().to_path_buf(), Duration::from_secs(3));
        assert!(!store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["Set-Foo"])));
        holder.join().unwrap();

        assert_eq!(store.count_entries(ParsingMode::Ast).unwrap(), 0);
        assert!(store.put(&entry("/p/a.ps1", 1, ParsingMode::Ast, &["Set-Foo"])));
    }

    #[test]
    fn test_concurrent_ensure_schema() {
        let dir = tempdir().unwrap();
        let path = open_store(dir.path()).path().to_path_buf();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let path = path.clone();
                thread::spawn(move || FragmentStore::new(path).ensure_schema().is_ok())
            })
            .collect();

        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_resolve_prefers_env_override() {
        let resolved = resolve_store_path_from(
            Some(PathBuf::from("/env/cache.db")),
            Some(PathBuf::from("/config/cache.db")),
            Some(PathBuf::from("/local")),
            Some(PathBuf::from("/home/user")),
        )
        .unwrap();
        assert_eq!(resolved, PathBuf::from("/env/cache.db"));
    }

    #[test]
    fn test_resolve_config_override() {
        let resolved = resolve_store_path_from(
            None,
            Some(PathBuf::from("/config/cache.db")),
            Some(PathBuf::from("/local")),
            None,
        )
        .unwrap();
        assert_eq!(resolved, PathBuf::from("/config/cache.db"));
    }

    #[test]
    fn test_resolve_local_data_dir() {
        let resolved = resolve_store_path_from(
            None,
            None,
            Some(PathBuf::from("/local")),
            Some(PathBuf::from("/home/user")),
        )
        .unwrap();
        assert_eq!(resolved, PathBuf::from("/local/shellfrag/fragment-cache.db"));
    }

    #[test]
    fn test_resolve_home_fallback() {
        let resolved =
            resolve_store_path_from(None, None, None, Some(PathBuf::from("/home/user"))).unwrap();
        assert_eq!(
            resolved,
            PathBuf::from("/home/user/.cache/shellfrag/fragment-cache.db")
        );
    }

    #[test]
    fn test_resolve_nothing_available() {
        let result = resolve_store_path_from(None, None, None, None);
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }
}
