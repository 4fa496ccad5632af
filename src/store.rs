// src/store.rs
//! SQLite persistence for articles, impact analyses, and the usage counter.
//!
//! Writers treat all tables as append-or-upsert only; the single in-place
//! mutation is retention deletion. Rows older than the retention horizon are
//! dropped at the start of every ingestion cycle.

use crate::error::StoreError;
use crate::quota::UsageLedger;
use crate::types::{EventCategory, ImpactAnalysis, MarketImpact, NewsArticle, Sentiment};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

const ANALYSIS_COLS: &str = "id, news_article_id, what_happened, why_matters, \
     market_impact_description, expected_points_impact, confidence_score, created_at";

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        if let Some(dir) = path.as_ref().parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        let conn = Connection::open(path)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn insert_article(&self, a: &NewsArticle) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO news_articles (id, title, content, summary, sentiment, market_impact, \
             category, source, url, companies, created_at, published_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                a.id,
                a.title,
                a.content,
                a.summary,
                a.sentiment.as_str(),
                a.market_impact.as_str(),
                a.category.as_str(),
                a.source,
                a.url,
                serde_json::to_string(&a.companies).unwrap_or_else(|_| "[]".to_string()),
                a.created_at.to_rfc3339(),
                a.published_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert_analysis(&self, an: &ImpactAnalysis) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.execute(
            &format!("INSERT INTO market_analysis ({ANALYSIS_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"),
            params![
                an.id,
                an.news_article_id,
                an.what_happened,
                an.why_matters,
                an.market_impact_description,
                an.expected_points_impact,
                an.confidence_score as i64,
                an.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Most recent analyses, newest first. The feed does not paginate;
    /// callers truncate.
    pub fn recent_analyses(&self, limit: usize) -> Result<Vec<ImpactAnalysis>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ANALYSIS_COLS} FROM market_analysis ORDER BY created_at DESC LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_analysis)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }

    pub fn article_by_id(&self, id: &str) -> Result<Option<NewsArticle>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, title, content, summary, sentiment, market_impact, category, source, \
             url, companies, created_at, published_at FROM news_articles WHERE id = ?1",
        )?;
        let mut rows = stmt.query_map(params![id], row_to_article)?;
        match rows.next() {
            Some(r) => Ok(Some(r?)),
            None => Ok(None),
        }
    }

    pub fn count_articles(&self) -> Result<u64, StoreError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM news_articles", [], |r| r.get(0))?;
        Ok(n as u64)
    }

    /// Retention cleanup. Returns (articles deleted, analyses deleted).
    pub fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<(u64, u64), StoreError> {
        let conn = self.lock()?;
        let cutoff = cutoff.to_rfc3339();
        let articles =
            conn.execute("DELETE FROM news_articles WHERE created_at < ?1", params![cutoff])?;
        let analyses = conn.execute(
            "DELETE FROM market_analysis WHERE created_at < ?1",
            params![cutoff],
        )?;
        Ok((articles as u64, analyses as u64))
    }
}

impl UsageLedger for Store {
    fn usage_for(&self, date: NaiveDate, api_name: &str) -> Result<u32, StoreError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT search_count FROM api_usage WHERE date = ?1 AND api_name = ?2")?;
        let mut rows = stmt.query_map(params![date.to_string(), api_name], |r| {
            r.get::<_, i64>(0)
        })?;
        match rows.next() {
            Some(n) => Ok(n? as u32),
            None => Ok(0),
        }
    }

    fn record_usage(
        &self,
        date: NaiveDate,
        api_name: &str,
        used: u32,
        delta: u32,
    ) -> Result<(), StoreError> {
        let conn = self.lock()?;
        // Upsert `used + delta`; never decrements. Two near-simultaneous
        // writers can both read the pre-increment count (accepted race, see
        // quota.rs tests).
        conn.execute(
            "INSERT INTO api_usage (date, api_name, search_count) VALUES (?1, ?2, ?3) \
             ON CONFLICT(date, api_name) DO UPDATE SET \
             search_count = MAX(search_count, excluded.search_count)",
            params![date.to_string(), api_name, (used + delta) as i64],
        )?;
        Ok(())
    }
}

fn row_to_analysis(row: &rusqlite::Row) -> Result<ImpactAnalysis, rusqlite::Error> {
    let created_str: String = row.get(7)?;
    Ok(ImpactAnalysis {
        id: row.get(0)?,
        news_article_id: row.get(1)?,
        what_happened: row.get(2)?,
        why_matters: row.get(3)?,
        market_impact_description: row.get(4)?,
        expected_points_impact: row.get(5)?,
        confidence_score: row.get::<_, i64>(6)?.clamp(0, 100) as u8,
        created_at: parse_ts(&created_str),
    })
}

fn row_to_article(row: &rusqlite::Row) -> Result<NewsArticle, rusqlite::Error> {
    let sentiment: String = row.get(4)?;
    let impact: String = row.get(5)?;
    let category: String = row.get(6)?;
    let companies: String = row.get(9)?;
    let created: String = row.get(10)?;
    let published: String = row.get(11)?;
    Ok(NewsArticle {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        summary: row.get(3)?,
        sentiment: match sentiment.as_str() {
            "positive" => Sentiment::Positive,
            "negative" => Sentiment::Negative,
            _ => Sentiment::Neutral,
        },
        market_impact: match impact.as_str() {
            "high" => MarketImpact::High,
            "medium" => MarketImpact::Medium,
            _ => MarketImpact::Low,
        },
        category: category.parse().unwrap_or(EventCategory::General),
        source: row.get(7)?,
        url: row.get(8)?,
        companies: serde_json::from_str(&companies).unwrap_or_default(),
        created_at: parse_ts(&created),
        published_at: parse_ts(&published),
    })
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS news_articles (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            content TEXT NOT NULL,
            summary TEXT NOT NULL,
            sentiment TEXT NOT NULL,
            market_impact TEXT NOT NULL,
            category TEXT NOT NULL,
            source TEXT NOT NULL,
            url TEXT,
            companies TEXT NOT NULL DEFAULT '[]',
            created_at TEXT NOT NULL,
            published_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS market_analysis (
            id TEXT PRIMARY KEY,
            news_article_id TEXT,
            what_happened TEXT NOT NULL,
            why_matters TEXT NOT NULL,
            market_impact_description TEXT NOT NULL,
            expected_points_impact REAL NOT NULL,
            confidence_score INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS api_usage (
            date TEXT NOT NULL,
            api_name TEXT NOT NULL,
            search_count INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (date, api_name)
        );

        CREATE INDEX IF NOT EXISTS idx_articles_created ON news_articles(created_at);
        CREATE INDEX IF NOT EXISTS idx_analysis_created ON market_analysis(created_at);
        ",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn article(id: &str, created_at: DateTime<Utc>) -> NewsArticle {
        NewsArticle {
            id: id.to_string(),
            title: "RBI holds repo rate".to_string(),
            content: "The central bank kept rates unchanged.".to_string(),
            summary: "Rates unchanged.".to_string(),
            sentiment: Sentiment::Neutral,
            market_impact: MarketImpact::Medium,
            category: EventCategory::Policy,
            source: "web-search".to_string(),
            url: Some("https://example.test/rbi".to_string()),
            companies: vec!["HDFC Bank".to_string()],
            created_at,
            published_at: created_at,
        }
    }

    fn analysis(id: &str, created_at: DateTime<Utc>) -> ImpactAnalysis {
        ImpactAnalysis {
            id: id.to_string(),
            news_article_id: None,
            what_happened: "RBI policy decision".to_string(),
            why_matters: "Sets the cost of money".to_string(),
            market_impact_description: "Banks react first".to_string(),
            expected_points_impact: 1.2,
            confidence_score: 85,
            created_at,
        }
    }

    #[test]
    fn article_round_trips() {
        let store = Store::open_in_memory().unwrap();
        let a = article("a1", Utc::now());
        store.insert_article(&a).unwrap();
        let back = store.article_by_id("a1").unwrap().unwrap();
        assert_eq!(back.title, a.title);
        assert_eq!(back.sentiment, Sentiment::Neutral);
        assert_eq!(back.companies, vec!["HDFC Bank".to_string()]);
    }

    #[test]
    fn recent_analyses_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store.insert_analysis(&analysis("old", now - Duration::hours(5))).unwrap();
        store.insert_analysis(&analysis("new", now)).unwrap();
        let rows = store.recent_analyses(10).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "new");
        assert_eq!(rows[1].id, "old");
    }

    #[test]
    fn retention_deletes_only_past_cutoff() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store.insert_article(&article("stale", now - Duration::days(8))).unwrap();
        store.insert_article(&article("fresh", now)).unwrap();
        store.insert_analysis(&analysis("stale_a", now - Duration::days(8))).unwrap();
        store.insert_analysis(&analysis("fresh_a", now)).unwrap();

        let (arts, ans) = store.delete_older_than(now - Duration::days(7)).unwrap();
        assert_eq!((arts, ans), (1, 1));
        assert!(store.article_by_id("stale").unwrap().is_none());
        assert!(store.article_by_id("fresh").unwrap().is_some());
        assert_eq!(store.recent_analyses(10).unwrap().len(), 1);
    }

    #[test]
    fn file_backed_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pulse.db");
        {
            let store = Store::open(&path).unwrap();
            store.insert_article(&article("a1", Utc::now())).unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.count_articles().unwrap(), 1);
        assert!(store.article_by_id("a1").unwrap().is_some());
    }

    #[test]
    fn usage_upsert_never_decrements() {
        let store = Store::open_in_memory().unwrap();
        let day = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        assert_eq!(store.usage_for(day, "search").unwrap(), 0);

        store.record_usage(day, "search", 0, 2).unwrap();
        assert_eq!(store.usage_for(day, "search").unwrap(), 2);

        store.record_usage(day, "search", 2, 2).unwrap();
        assert_eq!(store.usage_for(day, "search").unwrap(), 4);

        // A stale writer that read `used=0` cannot pull the counter back down.
        store.record_usage(day, "search", 0, 2).unwrap();
        assert_eq!(store.usage_for(day, "search").unwrap(), 4);
    }

    #[test]
    fn usage_is_keyed_by_day_and_api() {
        let store = Store::open_in_memory().unwrap();
        let d1 = NaiveDate::from_ymd_opt(2026, 8, 22).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 8, 23).unwrap();
        store.record_usage(d1, "search", 0, 5).unwrap();
        store.record_usage(d2, "ai", 0, 1).unwrap();
        assert_eq!(store.usage_for(d2, "search").unwrap(), 0);
        assert_eq!(store.usage_for(d1, "search").unwrap(), 5);
        assert_eq!(store.usage_for(d2, "ai").unwrap(), 1);
    }
}
