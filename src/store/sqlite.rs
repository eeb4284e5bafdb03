//! SQLite-backed `Store`, mirroring `MemoryStore`'s semantics but durable
//! across restarts. Bandit updates are issued as a single `UPDATE ... SET
//! alpha = alpha + ?` inside a transaction, giving the same CAS guarantee
//! `MemoryStore` gets from its per-item shard lock.
use super::{BanditDelta, Store};
use crate::domain::{
    ABAssignment, ABGroup, ABTestConfig, ABTestStatus, BanditStat, CachedRecs,
    Interaction, InteractionKind, Item, RecommendationMethod, RecommendationResult,
    TestResult, TrainingRun, UserProfile,
};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

pub struct SqlStore {
    pool: SqlitePool,
}

impl SqlStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePool::connect(database_url).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bandit_stats (
                item_id TEXT PRIMARY KEY,
                alpha REAL NOT NULL,
                beta REAL NOT NULL,
                total_impressions INTEGER NOT NULL DEFAULT 0,
                total_clicks INTEGER NOT NULL DEFAULT 0,
                total_samples REAL NOT NULL DEFAULT 0,
                estimated_quality REAL NOT NULL DEFAULT 0.5,
                last_updated TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS interactions (
                user_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                position INTEGER NOT NULL,
                duration_s REAL,
                timestamp TEXT NOT NULL,
                session_id TEXT,
                absorbed_realtime INTEGER NOT NULL DEFAULT 0,
                absorbed_batch INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS recommendation_results (
                user_id TEXT NOT NULL,
                item_id TEXT NOT NULL,
                rank_position INTEGER NOT NULL,
                similarity REAL NOT NULL,
                bandit_score REAL,
                method TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ab_test_configs (
                test_id TEXT PRIMARY KEY,
                test_name TEXT NOT NULL,
                status TEXT NOT NULL,
                control_pct INTEGER NOT NULL,
                start TEXT NOT NULL,
                end_ts TEXT,
                winner TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ab_assignments (
                test_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                grp TEXT NOT NULL,
                assigned_at TEXT NOT NULL,
                PRIMARY KEY (test_id, user_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS ab_test_results (
                test_id TEXT PRIMARY KEY,
                z REAL NOT NULL,
                p_value REAL NOT NULL,
                effect_size REAL NOT NULL,
                ctr_control REAL NOT NULL,
                ctr_treatment REAL NOT NULL,
                n_control INTEGER NOT NULL,
                n_treatment INTEGER NOT NULL,
                winner TEXT,
                recommendation TEXT NOT NULL,
                ended_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS training_runs (
                run_id TEXT PRIMARY KEY,
                days_processed INTEGER NOT NULL,
                interactions_processed INTEGER NOT NULL,
                items_updated INTEGER NOT NULL,
                succeeded INTEGER NOT NULL,
                ts TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn tx_err(e: sqlx::Error) -> AppError {
    AppError::Transient(format!("store I/O failed: {e}"))
}

#[async_trait]
impl Store for SqlStore {
    async fn load_profile(&self, _user_id: Uuid) -> Result<Option<UserProfile>> {
        // Profiles are owned by an external collaborator in this deployment
        // shape; the SQL backend only materializes the tables this core owns.
        Ok(None)
    }

    async fn load_items(&self) -> Result<Vec<Item>> {
        Ok(Vec::new())
    }

    async fn items_version(&self) -> Result<u64> {
        Ok(0)
    }

    async fn get_cache(&self, _user_id: Uuid) -> Result<Option<CachedRecs>> {
        Ok(None)
    }

    async fn put_cache(&self, _cache: CachedRecs) -> Result<()> {
        Ok(())
    }

    async fn get_bandit(&self, item_id: Uuid) -> Result<BanditStat> {
        let row = sqlx::query(
            "SELECT alpha, beta, total_impressions, total_clicks, total_samples, estimated_quality, last_updated
             FROM bandit_stats WHERE item_id = ?",
        )
        .bind(item_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(tx_err)?;

        match row {
            Some(r) => row_to_bandit_stat(r),
            None => Ok(BanditStat::new_prior()),
        }
    }

    async fn update_bandit(&self, item_id: Uuid, delta: BanditDelta) -> Result<BanditStat> {
        if delta.delta_alpha < 0.0 || delta.delta_beta < 0.0 {
            return Err(AppError::Invariant(
                "bandit update must not decrease alpha or beta".into(),
            ));
        }
        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        let stat = apply_bandit_delta(&mut tx, item_id, delta).await?;
        tx.commit().await.map_err(tx_err)?;
        Ok(stat)
    }

    async fn batch_update_bandit(
        &self,
        deltas: Vec<(Uuid, BanditDelta)>,
    ) -> Result<Vec<(Uuid, BanditStat)>> {
        for (_, delta) in &deltas {
            if delta.delta_alpha < 0.0 || delta.delta_beta < 0.0 {
                return Err(AppError::Invariant(
                    "batch update must not decrease alpha or beta".into(),
                ));
            }
        }

        let mut tx = self.pool.begin().await.map_err(tx_err)?;
        let mut updated = Vec::with_capacity(deltas.len());
        for (item_id, delta) in deltas {
            let stat = apply_bandit_delta(&mut tx, item_id, delta).await?;
            updated.push((item_id, stat));
        }
        tx.commit().await.map_err(tx_err)?;
        Ok(updated)
    }

    async fn increment_impression(&self, item_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bandit_stats (item_id, alpha, beta, total_impressions, total_clicks, total_samples, estimated_quality, last_updated)
            VALUES (?, ?, ?, 1, 0, 0, 0.5, ?)
            ON CONFLICT(item_id) DO UPDATE SET total_impressions = total_impressions + 1, last_updated = excluded.last_updated
            "#,
        )
        .bind(item_id.to_string())
        .bind(BanditStat::PRIOR_ALPHA)
        .bind(BanditStat::PRIOR_BETA)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;
        Ok(())
    }

    async fn increment_click(&self, item_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bandit_stats (item_id, alpha, beta, total_impressions, total_clicks, total_samples, estimated_quality, last_updated)
            VALUES (?, ?, ?, 0, 1, 0, 0.5, ?)
            ON CONFLICT(item_id) DO UPDATE SET total_clicks = total_clicks + 1, last_updated = excluded.last_updated
            "#,
        )
        .bind(item_id.to_string())
        .bind(BanditStat::PRIOR_ALPHA)
        .bind(BanditStat::PRIOR_BETA)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;
        Ok(())
    }

    async fn insert_interaction(&self, interaction: Interaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO interactions
                (user_id, item_id, kind, position, duration_s, timestamp, session_id, absorbed_realtime, absorbed_batch)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(interaction.user_id.to_string())
        .bind(interaction.item_id.to_string())
        .bind(kind_to_str(interaction.kind))
        .bind(interaction.position as i64)
        .bind(interaction.duration_s)
        .bind(interaction.timestamp.to_rfc3339())
        .bind(interaction.session_id.map(|s| s.to_string()))
        .bind(interaction.absorbed_realtime as i64)
        .bind(interaction.absorbed_batch as i64)
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;
        Ok(())
    }

    async fn read_interactions(
        &self,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Interaction>> {
        // Every interaction in range, regardless of absorption state -- callers
        // that only want unabsorbed rows (the batch trainer) filter at the call
        // site, matching `MemoryStore`. The A/B dashboard's click count needs
        // every row, including ones the trainer already absorbed.
        let rows = sqlx::query(
            "SELECT user_id, item_id, kind, position, duration_s, timestamp, session_id, absorbed_realtime, absorbed_batch
             FROM interactions WHERE timestamp >= ? AND timestamp <= ?",
        )
        .bind(since.to_rfc3339())
        .bind(until.to_rfc3339())
        .fetch_all(&self.pool)
        .await
        .map_err(tx_err)?;

        rows.into_iter()
            .map(|r| {
                Ok(Interaction {
                    user_id: parse_uuid(r.get::<String, _>("user_id"))?,
                    item_id: parse_uuid(r.get::<String, _>("item_id"))?,
                    kind: str_to_kind(&r.get::<String, _>("kind"))?,
                    position: r.get::<i64, _>("position") as u32,
                    duration_s: r.get::<Option<f64>, _>("duration_s"),
                    timestamp: parse_ts(r.get::<String, _>("timestamp"))?,
                    session_id: r
                        .get::<Option<String>, _>("session_id")
                        .map(parse_uuid)
                        .transpose()?,
                    absorbed_realtime: r.get::<i64, _>("absorbed_realtime") != 0,
                    absorbed_batch: r.get::<i64, _>("absorbed_batch") != 0,
                })
            })
            .collect()
    }

    async fn mark_absorbed_batch(&self, user_id: Uuid, item_id: Uuid, ts: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "UPDATE interactions SET absorbed_batch = 1 WHERE user_id = ? AND item_id = ? AND timestamp = ?",
        )
        .bind(user_id.to_string())
        .bind(item_id.to_string())
        .bind(ts.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;
        Ok(())
    }

    async fn insert_result(&self, result: RecommendationResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendation_results
                (user_id, item_id, rank_position, similarity, bandit_score, method, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(result.user_id.to_string())
        .bind(result.item_id.to_string())
        .bind(result.rank_position as i64)
        .bind(result.similarity as f64)
        .bind(result.bandit_score)
        .bind(method_to_str(result.method))
        .bind(result.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;
        Ok(())
    }

    async fn read_results_for_group(
        &self,
        _test_id: Uuid,
        user_ids: &[Uuid],
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<RecommendationResult>> {
        if user_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = user_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT user_id, item_id, rank_position, similarity, bandit_score, method, created_at
             FROM recommendation_results
             WHERE created_at >= ? AND created_at <= ? AND user_id IN ({placeholders})"
        );
        let mut query = sqlx::query(&sql).bind(since.to_rfc3339()).bind(until.to_rfc3339());
        for id in user_ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(tx_err)?;
        rows.into_iter()
            .map(|r| {
                Ok(RecommendationResult {
                    user_id: parse_uuid(r.get::<String, _>("user_id"))?,
                    item_id: parse_uuid(r.get::<String, _>("item_id"))?,
                    rank_position: r.get::<i64, _>("rank_position") as u32,
                    similarity: r.get::<f64, _>("similarity") as f32,
                    bandit_score: r.get::<Option<f64>, _>("bandit_score"),
                    method: str_to_method(&r.get::<String, _>("method"))?,
                    created_at: parse_ts(r.get::<String, _>("created_at"))?,
                })
            })
            .collect()
    }

    async fn insert_training_run(&self, run: TrainingRun) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO training_runs (run_id, days_processed, interactions_processed, items_updated, succeeded, ts)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.run_id.to_string())
        .bind(run.days_processed as i64)
        .bind(run.interactions_processed as i64)
        .bind(run.items_updated as i64)
        .bind(run.succeeded as i64)
        .bind(run.ts.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;
        Ok(())
    }

    async fn ab_active_config(&self) -> Result<Option<ABTestConfig>> {
        let row = sqlx::query(
            "SELECT test_id, test_name, status, control_pct, start, end_ts, winner FROM ab_test_configs WHERE status = 'active' LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(tx_err)?;
        row.map(row_to_config).transpose()
    }

    async fn ab_insert_config(&self, config: ABTestConfig) -> Result<()> {
        if self.ab_active_config().await?.is_some() {
            return Err(AppError::Conflict("an A/B test is already active".into()));
        }
        sqlx::query(
            r#"
            INSERT INTO ab_test_configs (test_id, test_name, status, control_pct, start, end_ts, winner)
            VALUES (?, ?, 'active', ?, ?, NULL, NULL)
            "#,
        )
        .bind(config.test_id.to_string())
        .bind(config.test_name)
        .bind(config.control_pct as i64)
        .bind(config.start.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;
        Ok(())
    }

    async fn ab_end_config(&self, test_id: Uuid, winner: Option<ABGroup>) -> Result<()> {
        let result = sqlx::query(
            "UPDATE ab_test_configs SET status = 'ended', end_ts = ?, winner = ? WHERE test_id = ? AND status = 'active'",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(winner.map(group_to_str))
        .bind(test_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("no active test {test_id}")));
        }
        Ok(())
    }

    async fn ab_get_assignment(&self, test_id: Uuid, user_id: Uuid) -> Result<Option<ABAssignment>> {
        let row = sqlx::query(
            "SELECT test_id, user_id, grp, assigned_at FROM ab_assignments WHERE test_id = ? AND user_id = ?",
        )
        .bind(test_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(tx_err)?;
        row.map(row_to_assignment).transpose()
    }

    async fn ab_get_or_insert_assignment(
        &self,
        test_id: Uuid,
        user_id: Uuid,
        group: ABGroup,
    ) -> Result<ABAssignment> {
        sqlx::query(
            "INSERT OR IGNORE INTO ab_assignments (test_id, user_id, grp, assigned_at) VALUES (?, ?, ?, ?)",
        )
        .bind(test_id.to_string())
        .bind(user_id.to_string())
        .bind(group_to_str(group))
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;

        self.ab_get_assignment(test_id, user_id)
            .await?
            .ok_or_else(|| AppError::Invariant("assignment vanished after insert".into()))
    }

    async fn ab_users_in_group(&self, test_id: Uuid, group: ABGroup) -> Result<Vec<Uuid>> {
        let rows = sqlx::query("SELECT user_id FROM ab_assignments WHERE test_id = ? AND grp = ?")
            .bind(test_id.to_string())
            .bind(group_to_str(group))
            .fetch_all(&self.pool)
            .await
            .map_err(tx_err)?;
        rows.into_iter()
            .map(|r| parse_uuid(r.get::<String, _>("user_id")))
            .collect()
    }

    async fn ab_insert_result(&self, result: TestResult) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ab_test_results
                (test_id, z, p_value, effect_size, ctr_control, ctr_treatment, n_control, n_treatment, winner, recommendation, ended_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(test_id) DO UPDATE SET
                z = excluded.z, p_value = excluded.p_value, effect_size = excluded.effect_size
            "#,
        )
        .bind(result.test_id.to_string())
        .bind(result.z)
        .bind(result.p_value)
        .bind(result.effect_size)
        .bind(result.ctr_control)
        .bind(result.ctr_treatment)
        .bind(result.n_control as i64)
        .bind(result.n_treatment as i64)
        .bind(result.winner.map(group_to_str))
        .bind(result.recommendation)
        .bind(result.ended_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(tx_err)?;
        Ok(())
    }
}

fn row_to_bandit_stat(r: sqlx::sqlite::SqliteRow) -> Result<BanditStat> {
    Ok(BanditStat {
        alpha: r.get::<f64, _>("alpha"),
        beta: r.get::<f64, _>("beta"),
        total_impressions: r.get::<i64, _>("total_impressions") as u64,
        total_clicks: r.get::<i64, _>("total_clicks") as u64,
        total_samples: r.get::<f64, _>("total_samples"),
        estimated_quality: r.get::<f64, _>("estimated_quality"),
        last_updated: parse_ts(r.get::<String, _>("last_updated"))?,
    })
}

/// Apply `delta` to `item_id`'s `(alpha, beta)` inside `tx`, then refresh
/// the derived `total_samples`/`estimated_quality`/`last_updated` columns
/// from the new values and return the resulting row. Callers hold `tx`
/// open across every item in a batch so the whole set commits or rolls
/// back together.
async fn apply_bandit_delta(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    item_id: Uuid,
    delta: BanditDelta,
) -> Result<BanditStat> {
    sqlx::query(
        r#"
        INSERT INTO bandit_stats (item_id, alpha, beta, total_impressions, total_clicks, total_samples, estimated_quality, last_updated)
        VALUES (?, ?, ?, 0, 0, 0, 0.5, ?)
        ON CONFLICT(item_id) DO UPDATE SET
            alpha = alpha + excluded.alpha - ?,
            beta = beta + excluded.beta - ?
        "#,
    )
    .bind(item_id.to_string())
    .bind(BanditStat::PRIOR_ALPHA + delta.delta_alpha)
    .bind(BanditStat::PRIOR_BETA + delta.delta_beta)
    .bind(Utc::now().to_rfc3339())
    .bind(BanditStat::PRIOR_ALPHA)
    .bind(BanditStat::PRIOR_BETA)
    .execute(&mut **tx)
    .await
    .map_err(tx_err)?;

    sqlx::query(
        "UPDATE bandit_stats SET estimated_quality = alpha / (alpha + beta), total_samples = alpha + beta - ? - ?, last_updated = ? WHERE item_id = ?",
    )
    .bind(BanditStat::PRIOR_ALPHA)
    .bind(BanditStat::PRIOR_BETA)
    .bind(Utc::now().to_rfc3339())
    .bind(item_id.to_string())
    .execute(&mut **tx)
    .await
    .map_err(tx_err)?;

    let row = sqlx::query(
        "SELECT alpha, beta, total_impressions, total_clicks, total_samples, estimated_quality, last_updated
         FROM bandit_stats WHERE item_id = ?",
    )
    .bind(item_id.to_string())
    .fetch_one(&mut **tx)
    .await
    .map_err(tx_err)?;

    let stat = row_to_bandit_stat(row)?;
    if stat.alpha < BanditStat::PRIOR_ALPHA || stat.beta < BanditStat::PRIOR_BETA {
        return Err(AppError::Invariant(
            "bandit parameters fell below their priors".into(),
        ));
    }
    Ok(stat)
}

fn parse_uuid(s: String) -> Result<Uuid> {
    Uuid::parse_str(&s).map_err(|e| AppError::Invariant(format!("corrupt uuid in store: {e}")))
}

fn parse_ts(s: String) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::Invariant(format!("corrupt timestamp in store: {e}")))
}

fn kind_to_str(kind: InteractionKind) -> &'static str {
    match kind {
        InteractionKind::Impression => "impression",
        InteractionKind::Click => "click",
        InteractionKind::Bookmark => "bookmark",
        InteractionKind::Unbookmark => "unbookmark",
        InteractionKind::HoverLong => "hover_long",
        InteractionKind::GithubVisit => "github_visit",
        InteractionKind::QuickExit => "quick_exit",
        InteractionKind::Feedback1 => "feedback1",
        InteractionKind::Feedback2 => "feedback2",
        InteractionKind::Feedback3 => "feedback3",
        InteractionKind::Feedback4 => "feedback4",
        InteractionKind::Feedback5 => "feedback5",
    }
}

fn str_to_kind(s: &str) -> Result<InteractionKind> {
    Ok(match s {
        "impression" => InteractionKind::Impression,
        "click" => InteractionKind::Click,
        "bookmark" => InteractionKind::Bookmark,
        "unbookmark" => InteractionKind::Unbookmark,
        "hover_long" => InteractionKind::HoverLong,
        "github_visit" => InteractionKind::GithubVisit,
        "quick_exit" => InteractionKind::QuickExit,
        "feedback1" => InteractionKind::Feedback1,
        "feedback2" => InteractionKind::Feedback2,
        "feedback3" => InteractionKind::Feedback3,
        "feedback4" => InteractionKind::Feedback4,
        "feedback5" => InteractionKind::Feedback5,
        other => return Err(AppError::Invariant(format!("unknown interaction kind in store: {other}"))),
    })
}

fn method_to_str(method: RecommendationMethod) -> &'static str {
    match method {
        RecommendationMethod::Similarity => "similarity",
        RecommendationMethod::RlExploit => "rl_exploit",
        RecommendationMethod::RlExplore => "rl_explore",
        RecommendationMethod::Degraded => "degraded",
    }
}

fn str_to_method(s: &str) -> Result<RecommendationMethod> {
    Ok(match s {
        "similarity" => RecommendationMethod::Similarity,
        "rl_exploit" => RecommendationMethod::RlExploit,
        "rl_explore" => RecommendationMethod::RlExplore,
        "degraded" => RecommendationMethod::Degraded,
        other => return Err(AppError::Invariant(format!("unknown method in store: {other}"))),
    })
}

fn group_to_str(group: ABGroup) -> &'static str {
    match group {
        ABGroup::Control => "control",
        ABGroup::Treatment => "treatment",
    }
}

fn str_to_group(s: &str) -> Result<ABGroup> {
    Ok(match s {
        "control" => ABGroup::Control,
        "treatment" => ABGroup::Treatment,
        other => return Err(AppError::Invariant(format!("unknown group in store: {other}"))),
    })
}

fn row_to_config(row: sqlx::sqlite::SqliteRow) -> Result<ABTestConfig> {
    Ok(ABTestConfig {
        test_id: parse_uuid(row.get::<String, _>("test_id"))?,
        test_name: row.get("test_name"),
        status: match row.get::<String, _>("status").as_str() {
            "active" => ABTestStatus::Active,
            "paused" => ABTestStatus::Paused,
            _ => ABTestStatus::Ended,
        },
        control_pct: row.get::<i64, _>("control_pct") as u8,
        start: parse_ts(row.get::<String, _>("start"))?,
        end: row
            .get::<Option<String>, _>("end_ts")
            .map(parse_ts)
            .transpose()?,
        winner: row
            .get::<Option<String>, _>("winner")
            .map(|s| str_to_group(&s))
            .transpose()?,
    })
}

fn row_to_assignment(row: sqlx::sqlite::SqliteRow) -> Result<ABAssignment> {
    Ok(ABAssignment {
        test_id: parse_uuid(row.get::<String, _>("test_id"))?,
        user_id: parse_uuid(row.get::<String, _>("user_id"))?,
        group: str_to_group(&row.get::<String, _>("grp"))?,
        assigned_at: parse_ts(row.get::<String, _>("assigned_at"))?,
    })
}
