use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthenticatedUser;
use crate::shared::enums::{HistoryAction, UserRole};
use crate::shared::schema::task_attachments;
use crate::shared::state::AppState;
use crate::tasks::history;

const MAX_ATTACHMENT_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = task_attachments)]
pub struct TaskAttachment {
    pub id: Uuid,
    pub task_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub file_type: String,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    pub id: Uuid,
    pub task_id: Uuid,
    pub filename: String,
    pub original_filename: String,
    pub file_size: i64,
    pub size_display: String,
    pub file_type: String,
    pub uploaded_by: Uuid,
    pub uploaded_at: DateTime<Utc>,
}

impl From<TaskAttachment> for AttachmentResponse {
    fn from(attachment: TaskAttachment) -> Self {
        AttachmentResponse {
            id: attachment.id,
            task_id: attachment.task_id,
            filename: attachment.filename,
            original_filename: attachment.original_filename,
            file_size: attachment.file_size,
            size_display: human_size(attachment.file_size),
            file_type: attachment.file_type,
            uploaded_by: attachment.uploaded_by,
            uploaded_at: attachment.uploaded_at,
        }
    }
}

pub fn human_size(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

/// Browsers send whatever the user typed; keep only the final path segment
/// and drop characters that break a Content-Disposition header.
fn sanitize_filename(raw: &str) -> String {
    let name = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw)
        .trim()
        .replace('"', "'");
    if name.is_empty() {
        "file".to_string()
    } else {
        name
    }
}

/// Disk name for an upload. The original extension is kept for content-type
/// sniffing; a name without one stays the bare uuid.
pub fn stored_name(attachment_id: Uuid, original: &str) -> String {
    match original.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => {
            format!("{}.{}", attachment_id, ext.to_lowercase())
        }
        _ => attachment_id.to_string(),
    }
}

fn upload_dir(state: &AppState) -> PathBuf {
    PathBuf::from(
        state
            .config
            .as_ref()
            .map(|c| c.upload_dir.clone())
            .unwrap_or_else(|| "./uploads".to_string()),
    )
}

pub async fn upload_attachment(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(task): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<AttachmentResponse>, (StatusCode, String)> {
    use crate::shared::schema::tasks::dsl as tasks_dsl;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = tasks_dsl::tasks
        .filter(tasks_dsl::id.eq(task))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let mut upload: Option<(String, Option<String>, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Upload error: {e}")))?
    {
        let Some(raw_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let content_type = field.content_type().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Upload error: {e}")))?;
        upload = Some((sanitize_filename(&raw_name), content_type, data.to_vec()));
        break;
    }
    let Some((original_filename, content_type, data)) = upload else {
        return Err((
            StatusCode::BAD_REQUEST,
            "No file field in upload".to_string(),
        ));
    };
    if data.len() > MAX_ATTACHMENT_BYTES {
        return Err((
            StatusCode::PAYLOAD_TOO_LARGE,
            format!(
                "File exceeds the {} limit",
                human_size(MAX_ATTACHMENT_BYTES as i64)
            ),
        ));
    }

    let attachment_id = Uuid::new_v4();
    let filename = stored_name(attachment_id, &original_filename);
    let file_type = content_type.unwrap_or_else(|| {
        mime_guess::from_path(&original_filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    });

    let dir = upload_dir(&state);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {e}")))?;
    tokio::fs::write(dir.join(&filename), &data)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Storage error: {e}")))?;

    let attachment = TaskAttachment {
        id: attachment_id,
        task_id: task,
        filename,
        original_filename: original_filename.clone(),
        file_size: data.len() as i64,
        file_type,
        uploaded_by: auth.user.id,
        uploaded_at: Utc::now(),
    };
    diesel::insert_into(task_attachments::table)
        .values(&attachment)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    history::record(
        &mut conn,
        task,
        auth.user.id,
        HistoryAction::AttachmentAdded,
        None,
        None,
        Some(original_filename),
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("History error: {e}")))?;

    info!(
        "Attachment {} uploaded to task {} ({})",
        attachment.original_filename,
        task,
        human_size(attachment.file_size)
    );
    Ok(Json(attachment.into()))
}

pub async fn list_attachments(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(task): Path<Uuid>,
) -> Result<Json<Vec<AttachmentResponse>>, (StatusCode, String)> {
    use crate::shared::schema::task_attachments::dsl::*;
    use crate::shared::schema::tasks::dsl as tasks_dsl;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let exists: i64 = tasks_dsl::tasks
        .filter(tasks_dsl::id.eq(task))
        .count()
        .get_result(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;
    if exists == 0 {
        return Err((StatusCode::NOT_FOUND, "Task not found".to_string()));
    }

    let rows: Vec<TaskAttachment> = task_attachments
        .filter(task_id.eq(task))
        .order(uploaded_at.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(rows.into_iter().map(AttachmentResponse::from).collect()))
}

pub async fn download_attachment(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedUser,
    Path(attachment_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    use crate::shared::schema::task_attachments::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let attachment: TaskAttachment = task_attachments
        .filter(id.eq(attachment_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Attachment not found".to_string()))?;

    let path = upload_dir(&state).join(&attachment.filename);
    let bytes = tokio::fs::read(&path).await.map_err(|_| {
        (
            StatusCode::NOT_FOUND,
            "Attachment file is missing".to_string(),
        )
    })?;

    Ok((
        [
            (header::CONTENT_TYPE, attachment.file_type.clone()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"",
                    attachment.original_filename
                ),
            ),
        ],
        bytes,
    ))
}

pub async fn delete_attachment(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedUser,
    Path(attachment_id): Path<Uuid>,
) -> Result<StatusCode, (StatusCode, String)> {
    use crate::shared::schema::task_attachments::dsl::*;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let attachment: TaskAttachment = task_attachments
        .filter(id.eq(attachment_id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Attachment not found".to_string()))?;

    if attachment.uploaded_by != auth.user.id && !auth.user.can_act_as(UserRole::Manager) {
        return Err((
            StatusCode::FORBIDDEN,
            "Only the uploader or a manager can delete an attachment".to_string(),
        ));
    }

    diesel::delete(task_attachments.filter(id.eq(attachment_id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    // The row is authoritative; a stray file on disk is only worth a warning.
    let path = upload_dir(&state).join(&attachment.filename);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        warn!("Failed to remove attachment file {:?}: {}", path, e);
    }

    info!(
        "Deleted attachment {} from task {}",
        attachment.original_filename, attachment.task_id
    );
    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_attachments_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/tasks/:id/attachments",
            get(list_attachments).post(upload_attachment),
        )
        .route(
            "/api/attachments/:id",
            get(download_attachment).delete(delete_attachment),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_step_through_units() {
        assert_eq!(human_size(0), "0.0 B");
        assert_eq!(human_size(512), "512.0 B");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(human_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }

    #[test]
    fn terabytes_are_the_ceiling() {
        let two_pb = 2_i64 * 1024 * 1024 * 1024 * 1024 * 1024;
        assert_eq!(human_size(two_pb), "2048.0 TB");
    }

    #[test]
    fn stored_name_keeps_the_extension() {
        let attachment_id = Uuid::new_v4();
        assert_eq!(
            stored_name(attachment_id, "Report Final.PDF"),
            format!("{}.pdf", attachment_id)
        );
    }

    #[test]
    fn stored_name_without_extension_is_bare() {
        let attachment_id = Uuid::new_v4();
        assert_eq!(stored_name(attachment_id, "README"), attachment_id.to_string());
        assert_eq!(
            stored_name(attachment_id, ".gitignore"),
            attachment_id.to_string()
        );
    }

    #[test]
    fn filenames_lose_their_path() {
        assert_eq!(sanitize_filename("/tmp/evil/notes.txt"), "notes.txt");
        assert_eq!(sanitize_filename("C:\\Users\\x\\doc.docx"), "doc.docx");
        assert_eq!(sanitize_filename("  "), "file");
        assert_eq!(sanitize_filename("say \"hi\".txt"), "say 'hi'.txt");
    }

    #[test]
    fn equal_originals_coexist_on_disk() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join(stored_name(Uuid::new_v4(), "report.pdf"));
        let second = dir.path().join(stored_name(Uuid::new_v4(), "report.pdf"));
        std::fs::write(&first, b"one").expect("write first");
        std::fs::write(&second, b"two").expect("write second");
        assert_ne!(first, second);
        assert_eq!(std::fs::read(&first).expect("read first"), b"one");
        assert_eq!(std::fs::read(&second).expect("read second"), b"two");
    }
}
