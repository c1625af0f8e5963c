use chrono::{DateTime, NaiveDateTime, Utc};
use rand::Rng;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

use crate::types::{
    AiPrompts, AnswerMap, ChatMessage, ChatRole, ChatSession, InitialAnalysis, JudgeReport,
    JudgeReview, KnowledgeDocument, OfficeSettings, Petition, PetitionStatus, PetitionStructure,
    ReviewAnalysis, ReviewStatus, UserProfile, UserRole,
};

const SCHEMA_SQL: &str = include_str!("../../../schema.sql");

/// Embedded document store. Every domain query is scoped by tenant id; the
/// connection mutex serializes writes so single-record upserts never
/// interleave at the field level.
pub struct Store {
    conn: Mutex<Connection>,
}

// ── Timestamp helpers ─────────────────────────────────────────────────────

fn parse_ts(s: &str) -> DateTime<Utc> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map(|ndt| ndt.and_utc())
        .unwrap_or_else(|_| Utc::now())
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn now_str() -> String {
    fmt_ts(Utc::now())
}

/// Random 16-hex-char record id.
pub fn new_id() -> String {
    let mut rng = rand::thread_rng();
    (0..16)
        .map(|_| {
            let n: u8 = rng.gen_range(0..16);
            char::from_digit(u32::from(n), 16).unwrap_or('0')
        })
        .collect()
}

// ── JSON column helpers ───────────────────────────────────────────────────

fn to_json<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn opt_json<T: serde::de::DeserializeOwned>(s: Option<String>) -> Option<T> {
    s.and_then(|s| serde_json::from_str(&s).ok())
}

fn json_or_default<T: serde::de::DeserializeOwned + Default>(s: String) -> T {
    serde_json::from_str(&s).unwrap_or_default()
}

// ── Row mappers ───────────────────────────────────────────────────────────

fn row_to_petition(row: &rusqlite::Row<'_>) -> rusqlite::Result<Petition> {
    let status: String = row.get(6)?;
    let attachment_refs: String = row.get(8)?;
    let answers: String = row.get(10)?;
    let created_at: String = row.get(15)?;
    let updated_at: String = row.get(16)?;
    Ok(Petition {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        owner_id: row.get(2)?,
        title: row.get(3)?,
        area: row.get(4)?,
        doc_type: row.get(5)?,
        status: PetitionStatus::parse(&status).unwrap_or(PetitionStatus::Error),
        facts: row.get(7)?,
        attachment_refs: json_or_default(attachment_refs),
        analysis: opt_json::<InitialAnalysis>(row.get(9)?),
        answers: json_or_default::<AnswerMap>(answers),
        structure: opt_json::<PetitionStructure>(row.get(11)?),
        content: row.get(12)?,
        docx_path: row.get(13)?,
        docx_url: row.get(14)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn row_to_review(row: &rusqlite::Row<'_>) -> rusqlite::Result<JudgeReview> {
    let status: String = row.get(7)?;
    let attachment_refs: String = row.get(6)?;
    let answers: String = row.get(9)?;
    let created_at: String = row.get(13)?;
    let updated_at: String = row.get(14)?;
    Ok(JudgeReview {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        owner_id: row.get(2)?,
        description: row.get(3)?,
        petition_text: row.get(4)?,
        main_file_ref: row.get(5)?,
        attachment_refs: json_or_default(attachment_refs),
        status: ReviewStatus::parse(&status).unwrap_or(ReviewStatus::Error),
        analysis: opt_json::<ReviewAnalysis>(row.get(8)?),
        answers: json_or_default::<AnswerMap>(answers),
        report: opt_json::<JudgeReport>(row.get(10)?),
        docx_path: row.get(11)?,
        docx_url: row.get(12)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatSession> {
    let last_message_at: Option<String> = row.get(7)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(ChatSession {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        owner_id: row.get(2)?,
        client_name: row.get(3)?,
        area: row.get(4)?,
        status: row.get(5)?,
        last_message: row.get(6)?,
        last_message_at: last_message_at.map(|s| parse_ts(&s)),
        report_path: row.get(8)?,
        report_url: row.get(9)?,
        created_at: parse_ts(&created_at),
        updated_at: parse_ts(&updated_at),
    })
}

fn row_to_chat_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatMessage> {
    let role: String = row.get(2)?;
    let created_at: String = row.get(5)?;
    Ok(ChatMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        role: ChatRole::parse(&role).unwrap_or(ChatRole::User),
        content: row.get(3)?,
        file_ref: row.get(4)?,
        created_at: parse_ts(&created_at),
    })
}

fn row_to_knowledge(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeDocument> {
    let created_at: String = row.get(5)?;
    Ok(KnowledgeDocument {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        category: row.get(3)?,
        areas: Vec::new(),
        blob_ref: row.get(4)?,
        created_at: parse_ts(&created_at),
    })
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserProfile> {
    let role: String = row.get(4)?;
    let active: i64 = row.get(5)?;
    let created_at: String = row.get(6)?;
    Ok(UserProfile {
        uid: row.get(0)?,
        tenant_id: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        role: UserRole::parse(&role).unwrap_or(UserRole::Assistant),
        active: active != 0,
        created_at: parse_ts(&created_at),
    })
}

const PETITION_COLS: &str = "id, tenant_id, owner_id, title, area, doc_type, status, facts, \
     attachment_refs, analysis, answers, structure, content, docx_path, docx_url, \
     created_at, updated_at";

const REVIEW_COLS: &str = "id, tenant_id, owner_id, description, petition_text, main_file_ref, \
     attachment_refs, status, analysis, answers, report, docx_path, docx_url, \
     created_at, updated_at";

const SESSION_COLS: &str = "id, tenant_id, owner_id, client_name, area, status, last_message, \
     last_message_at, report_path, report_url, created_at, updated_at";

impl Store {
    pub fn open(path: &str) -> rusqlite::Result<Self> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn migrate(&self) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute_batch(SCHEMA_SQL)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Runs `f` inside an exclusive transaction. Used by the rate limiter,
    /// whose read-filter-append must not race with a concurrent check.
    pub(crate) fn with_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T>,
    ) -> rusqlite::Result<T> {
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    // ── Tenants & users ───────────────────────────────────────────────────

    pub fn upsert_tenant(&self, id: &str, name: &str) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT INTO tenants (id, name, created_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
            params![id, name, now_str()],
        )?;
        Ok(())
    }

    pub fn tenant_for_uid(&self, uid: &str) -> rusqlite::Result<Option<String>> {
        self.lock()
            .query_row(
                "SELECT tenant_id FROM user_index WHERE uid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()
    }

    pub fn set_user_index(&self, uid: &str, tenant_id: &str) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT INTO user_index (uid, tenant_id) VALUES (?1, ?2)
             ON CONFLICT(uid) DO UPDATE SET tenant_id = excluded.tenant_id",
            params![uid, tenant_id],
        )?;
        Ok(())
    }

    pub fn insert_user(&self, user: &UserProfile) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT INTO users (uid, tenant_id, email, display_name, role, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tenant_id, uid) DO UPDATE SET
                 email = excluded.email,
                 display_name = excluded.display_name,
                 role = excluded.role",
            params![
                user.uid,
                user.tenant_id,
                user.email,
                user.display_name,
                user.role.as_str(),
                user.active as i64,
                fmt_ts(user.created_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_user(&self, tenant_id: &str, uid: &str) -> rusqlite::Result<Option<UserProfile>> {
        self.lock()
            .query_row(
                "SELECT uid, tenant_id, email, display_name, role, active, created_at
                 FROM users WHERE tenant_id = ?1 AND uid = ?2",
                params![tenant_id, uid],
                row_to_user,
            )
            .optional()
    }

    pub fn set_user_active(
        &self,
        tenant_id: &str,
        uid: &str,
        active: bool,
    ) -> rusqlite::Result<bool> {
        let n = self.lock().execute(
            "UPDATE users SET active = ?3 WHERE tenant_id = ?1 AND uid = ?2",
            params![tenant_id, uid, active as i64],
        )?;
        Ok(n > 0)
    }

    // ── Tenant settings ───────────────────────────────────────────────────

    fn get_setting(&self, tenant_id: &str, name: &str) -> rusqlite::Result<Option<String>> {
        self.lock()
            .query_row(
                "SELECT value FROM tenant_settings WHERE tenant_id = ?1 AND name = ?2",
                params![tenant_id, name],
                |row| row.get(0),
            )
            .optional()
    }

    fn set_setting(&self, tenant_id: &str, name: &str, value: &str) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT INTO tenant_settings (tenant_id, name, value) VALUES (?1, ?2, ?3)
             ON CONFLICT(tenant_id, name) DO UPDATE SET value = excluded.value",
            params![tenant_id, name, value],
        )?;
        Ok(())
    }

    pub fn get_prompts(&self, tenant_id: &str) -> rusqlite::Result<AiPrompts> {
        Ok(opt_json(self.get_setting(tenant_id, "prompts")?).unwrap_or_default())
    }

    pub fn set_prompts(&self, tenant_id: &str, prompts: &AiPrompts) -> rusqlite::Result<()> {
        self.set_setting(tenant_id, "prompts", &to_json(prompts))
    }

    pub fn get_office(&self, tenant_id: &str) -> rusqlite::Result<Option<OfficeSettings>> {
        Ok(opt_json(self.get_setting(tenant_id, "office")?))
    }

    pub fn set_office(&self, tenant_id: &str, office: &OfficeSettings) -> rusqlite::Result<()> {
        self.set_setting(tenant_id, "office", &to_json(office))
    }

    // ── Petitions ─────────────────────────────────────────────────────────

    pub fn insert_petition(&self, petition: &Petition) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT INTO petitions (id, tenant_id, owner_id, title, area, doc_type, status,
                 facts, attachment_refs, answers, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                petition.id,
                petition.tenant_id,
                petition.owner_id,
                petition.title,
                petition.area,
                petition.doc_type,
                petition.status.as_str(),
                petition.facts,
                to_json(&petition.attachment_refs),
                to_json(&petition.answers),
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_petition(&self, tenant_id: &str, id: &str) -> rusqlite::Result<Option<Petition>> {
        self.lock()
            .query_row(
                &format!("SELECT {PETITION_COLS} FROM petitions WHERE tenant_id = ?1 AND id = ?2"),
                params![tenant_id, id],
                row_to_petition,
            )
            .optional()
    }

    pub fn list_petitions(&self, tenant_id: &str) -> rusqlite::Result<Vec<Petition>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PETITION_COLS} FROM petitions WHERE tenant_id = ?1 ORDER BY updated_at DESC"
        ))?;
        let rows = stmt.query_map(params![tenant_id], row_to_petition)?;
        rows.collect()
    }

    /// Persists the analysis together with the intake fields the caller
    /// supplied for this run (facts and attachment refs may have been edited
    /// since the record was created).
    pub fn set_petition_analysis(
        &self,
        tenant_id: &str,
        id: &str,
        facts: &str,
        attachment_refs: &[String],
        analysis: &InitialAnalysis,
        status: PetitionStatus,
    ) -> rusqlite::Result<()> {
        self.lock().execute(
            "UPDATE petitions SET facts = ?3, attachment_refs = ?4, analysis = ?5,
                 status = ?6, updated_at = ?7
             WHERE tenant_id = ?1 AND id = ?2",
            params![
                tenant_id,
                id,
                facts,
                to_json(&attachment_refs),
                to_json(analysis),
                status.as_str(),
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn set_petition_structure(
        &self,
        tenant_id: &str,
        id: &str,
        structure: &PetitionStructure,
        answers: &AnswerMap,
        status: PetitionStatus,
    ) -> rusqlite::Result<()> {
        self.lock().execute(
            "UPDATE petitions SET structure = ?3, answers = ?4, status = ?5, updated_at = ?6
             WHERE tenant_id = ?1 AND id = ?2",
            params![
                tenant_id,
                id,
                to_json(structure),
                to_json(answers),
                status.as_str(),
                now_str(),
            ],
        )?;
        Ok(())
    }

    /// Single update for the terminal stage: generated text and rendered
    /// artifact land together with the completed status, so a completed
    /// petition can never be observed without its artifact reference.
    pub fn set_petition_content(
        &self,
        tenant_id: &str,
        id: &str,
        content: &str,
        docx_path: &str,
        docx_url: &str,
    ) -> rusqlite::Result<()> {
        self.lock().execute(
            "UPDATE petitions SET content = ?3, docx_path = ?4, docx_url = ?5,
                 status = ?6, updated_at = ?7
             WHERE tenant_id = ?1 AND id = ?2",
            params![
                tenant_id,
                id,
                content,
                docx_path,
                docx_url,
                PetitionStatus::Completed.as_str(),
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn set_petition_status(
        &self,
        tenant_id: &str,
        id: &str,
        status: PetitionStatus,
    ) -> rusqlite::Result<()> {
        self.lock().execute(
            "UPDATE petitions SET status = ?3, updated_at = ?4 WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id, id, status.as_str(), now_str()],
        )?;
        Ok(())
    }

    // ── Judge reviews ─────────────────────────────────────────────────────

    pub fn insert_review(&self, review: &JudgeReview) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT INTO judge_reviews (id, tenant_id, owner_id, description, petition_text,
                 main_file_ref, attachment_refs, status, answers, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
            params![
                review.id,
                review.tenant_id,
                review.owner_id,
                review.description,
                review.petition_text,
                review.main_file_ref,
                to_json(&review.attachment_refs),
                review.status.as_str(),
                to_json(&review.answers),
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_review(&self, tenant_id: &str, id: &str) -> rusqlite::Result<Option<JudgeReview>> {
        self.lock()
            .query_row(
                &format!("SELECT {REVIEW_COLS} FROM judge_reviews WHERE tenant_id = ?1 AND id = ?2"),
                params![tenant_id, id],
                row_to_review,
            )
            .optional()
    }

    pub fn list_reviews(&self, tenant_id: &str) -> rusqlite::Result<Vec<JudgeReview>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REVIEW_COLS} FROM judge_reviews WHERE tenant_id = ?1 ORDER BY updated_at DESC"
        ))?;
        let rows = stmt.query_map(params![tenant_id], row_to_review)?;
        rows.collect()
    }

    pub fn set_review_analysis(
        &self,
        tenant_id: &str,
        id: &str,
        description: &str,
        petition_text: Option<&str>,
        main_file_ref: Option<&str>,
        attachment_refs: &[String],
        analysis: &ReviewAnalysis,
        status: ReviewStatus,
    ) -> rusqlite::Result<()> {
        self.lock().execute(
            "UPDATE judge_reviews SET description = ?3, petition_text = ?4, main_file_ref = ?5,
                 attachment_refs = ?6, analysis = ?7, status = ?8, updated_at = ?9
             WHERE tenant_id = ?1 AND id = ?2",
            params![
                tenant_id,
                id,
                description,
                petition_text,
                main_file_ref,
                to_json(&attachment_refs),
                to_json(analysis),
                status.as_str(),
                now_str(),
            ],
        )?;
        Ok(())
    }

    /// Terminal update for a review: report, answers and artifact reference
    /// land with the completed status in one write.
    pub fn set_review_report(
        &self,
        tenant_id: &str,
        id: &str,
        report: &JudgeReport,
        answers: &AnswerMap,
        docx_path: &str,
        docx_url: &str,
    ) -> rusqlite::Result<()> {
        self.lock().execute(
            "UPDATE judge_reviews SET report = ?3, answers = ?4, docx_path = ?5, docx_url = ?6,
                 status = ?7, updated_at = ?8
             WHERE tenant_id = ?1 AND id = ?2",
            params![
                tenant_id,
                id,
                to_json(report),
                to_json(answers),
                docx_path,
                docx_url,
                ReviewStatus::Completed.as_str(),
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn set_review_status(
        &self,
        tenant_id: &str,
        id: &str,
        status: ReviewStatus,
    ) -> rusqlite::Result<()> {
        self.lock().execute(
            "UPDATE judge_reviews SET status = ?3, updated_at = ?4
             WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id, id, status.as_str(), now_str()],
        )?;
        Ok(())
    }

    // ── Chat sessions ─────────────────────────────────────────────────────

    pub fn insert_chat_session(&self, session: &ChatSession) -> rusqlite::Result<()> {
        self.lock().execute(
            "INSERT INTO chat_sessions (id, tenant_id, owner_id, client_name, area, status,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
            params![
                session.id,
                session.tenant_id,
                session.owner_id,
                session.client_name,
                session.area,
                session.status,
                now_str(),
            ],
        )?;
        Ok(())
    }

    pub fn get_chat_session(
        &self,
        tenant_id: &str,
        id: &str,
    ) -> rusqlite::Result<Option<ChatSession>> {
        self.lock()
            .query_row(
                &format!("SELECT {SESSION_COLS} FROM chat_sessions WHERE tenant_id = ?1 AND id = ?2"),
                params![tenant_id, id],
                row_to_session,
            )
            .optional()
    }

    pub fn list_chat_sessions(&self, tenant_id: &str) -> rusqlite::Result<Vec<ChatSession>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLS} FROM chat_sessions WHERE tenant_id = ?1 ORDER BY updated_at DESC"
        ))?;
        let rows = stmt.query_map(params![tenant_id], row_to_session)?;
        rows.collect()
    }

    pub fn append_chat_message(
        &self,
        tenant_id: &str,
        session_id: &str,
        role: ChatRole,
        content: &str,
        file_ref: Option<&str>,
    ) -> rusqlite::Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO chat_messages (tenant_id, session_id, role, content, file_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![tenant_id, session_id, role.as_str(), content, file_ref, now_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_chat_messages(
        &self,
        tenant_id: &str,
        session_id: &str,
    ) -> rusqlite::Result<Vec<ChatMessage>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, session_id, role, content, file_ref, created_at
             FROM chat_messages WHERE tenant_id = ?1 AND session_id = ?2 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![tenant_id, session_id], row_to_chat_message)?;
        rows.collect()
    }

    pub fn set_session_summary(
        &self,
        tenant_id: &str,
        session_id: &str,
        preview: &str,
    ) -> rusqlite::Result<()> {
        let now = now_str();
        self.lock().execute(
            "UPDATE chat_sessions SET last_message = ?3, last_message_at = ?4, updated_at = ?4
             WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id, session_id, preview, now],
        )?;
        Ok(())
    }

    pub fn set_session_report(
        &self,
        tenant_id: &str,
        session_id: &str,
        report_path: &str,
        report_url: &str,
    ) -> rusqlite::Result<()> {
        self.lock().execute(
            "UPDATE chat_sessions SET report_path = ?3, report_url = ?4, updated_at = ?5
             WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id, session_id, report_path, report_url, now_str()],
        )?;
        Ok(())
    }

    // ── Knowledge base ────────────────────────────────────────────────────

    pub fn insert_knowledge(&self, doc: &KnowledgeDocument) -> rusqlite::Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO knowledge_docs (id, tenant_id, name, category, blob_ref, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doc.id,
                doc.tenant_id,
                doc.name,
                doc.category,
                doc.blob_ref,
                fmt_ts(doc.created_at),
            ],
        )?;
        for area in &doc.areas {
            conn.execute(
                "INSERT OR IGNORE INTO knowledge_areas (tenant_id, doc_id, area) VALUES (?1, ?2, ?3)",
                params![doc.tenant_id, doc.id, area],
            )?;
        }
        Ok(())
    }

    pub fn delete_knowledge(&self, tenant_id: &str, id: &str) -> rusqlite::Result<bool> {
        let conn = self.lock();
        conn.execute(
            "DELETE FROM knowledge_areas WHERE tenant_id = ?1 AND doc_id = ?2",
            params![tenant_id, id],
        )?;
        let n = conn.execute(
            "DELETE FROM knowledge_docs WHERE tenant_id = ?1 AND id = ?2",
            params![tenant_id, id],
        )?;
        Ok(n > 0)
    }

    pub fn list_knowledge(&self, tenant_id: &str) -> rusqlite::Result<Vec<KnowledgeDocument>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, category, blob_ref, created_at
             FROM knowledge_docs WHERE tenant_id = ?1 ORDER BY created_at DESC, rowid DESC",
        )?;
        let mut docs: Vec<KnowledgeDocument> =
            stmt.query_map(params![tenant_id], row_to_knowledge)?
                .collect::<rusqlite::Result<_>>()?;
        let mut area_stmt = conn.prepare(
            "SELECT area FROM knowledge_areas WHERE tenant_id = ?1 AND doc_id = ?2 ORDER BY area",
        )?;
        for doc in &mut docs {
            let areas = area_stmt.query_map(params![tenant_id, doc.id], |row| row.get(0))?;
            doc.areas = areas.collect::<rusqlite::Result<_>>()?;
        }
        Ok(docs)
    }

    /// Blob refs of documents tagged with `area`, newest first.
    pub fn knowledge_refs_by_area(
        &self,
        tenant_id: &str,
        area: &str,
        limit: usize,
    ) -> rusqlite::Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT k.blob_ref FROM knowledge_docs k
             JOIN knowledge_areas a ON a.tenant_id = k.tenant_id AND a.doc_id = k.id
             WHERE k.tenant_id = ?1 AND a.area = ?2
             ORDER BY k.created_at DESC, k.rowid DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![tenant_id, area, limit as i64], |row| row.get(0))?;
        rows.collect()
    }

    /// Blob refs of the most recent documents regardless of tags.
    pub fn knowledge_refs_recent(
        &self,
        tenant_id: &str,
        limit: usize,
    ) -> rusqlite::Result<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT blob_ref FROM knowledge_docs WHERE tenant_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![tenant_id, limit as i64], |row| row.get(0))?;
        rows.collect()
    }
}
