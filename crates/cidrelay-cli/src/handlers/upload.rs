//! Upload handlers

use super::node_failure;
use crate::{ApiError, AppState};
use axum::{
    extract::{multipart::Field, Multipart, State},
    response::Json,
};
use bytes::Bytes;
use cidrelay_resolver::preview::guess_mime;
use cidrelay_resolver::{normalize_relative_path, FolderEntry, ProvideTask, Visibility};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, instrument};

const PATH_FIELD_PREFIX: &str = "paths_";

/// Response of `POST /upload`
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: &'static str,
    pub cid: String,
    pub visibility: Visibility,
}

struct UploadForm {
    filename: String,
    data: Bytes,
    visibility: Visibility,
}

/// POST /upload - Add a file to the local node.
///
/// Multipart fields: `file` (required) and `visibility` (`public` or
/// `private`, default public). Public uploads are announced to the DHT in
/// the background.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let form = read_form(multipart).await?;
    let cid = add_to_node(&state, &form).await?;

    if form.visibility == Visibility::Public {
        announce(&state, &cid);
    }

    Ok(Json(UploadResponse {
        message: "File uploaded and added to IPFS",
        cid,
        visibility: form.visibility,
    }))
}

#[instrument(skip(state, form), fields(filename = %form.filename, size = form.data.len()))]
async fn add_to_node(state: &AppState, form: &UploadForm) -> Result<String, ApiError> {
    let cid = state
        .node
        .add(form.data.clone(), &form.filename, form.visibility)
        .await
        .map_err(|e| {
            node_failure(
                e,
                "Upload timeout - file too large or network slow. Please try again.",
                "Failed to add to IPFS",
            )
        })?;

    info!(cid = %cid, visibility = form.visibility.as_str(), "File added");
    Ok(cid)
}

/// Announce a public upload in the background
fn announce(state: &AppState, cid: &str) {
    let task = ProvideTask::spawn(
        Arc::clone(&state.node),
        cid.to_string(),
        state.config.provide_timeout(),
    );
    debug!(cid = %task.cid(), "DHT announcement scheduled");
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm, ApiError> {
    let mut file: Option<(String, Bytes)> = None;
    let mut visibility = Visibility::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(e.to_string()))?;
                file = Some((filename, data));
            }
            Some("visibility") => {
                visibility = read_visibility(field).await?;
            }
            _ => {}
        }
    }

    let (filename, data) = file.ok_or_else(|| ApiError::bad_request("No file provided"))?;
    if filename.is_empty() {
        return Err(ApiError::bad_request("No selected file"));
    }

    Ok(UploadForm {
        filename,
        data,
        visibility,
    })
}

async fn read_visibility(field: Field<'_>) -> Result<Visibility, ApiError> {
    let value = field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid visibility: {}", value)))
}

/// One file of an uploaded folder as reported back to the client
#[derive(Debug, Serialize)]
pub struct FolderFile {
    pub path: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
}

/// Response of `POST /upload-folder`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderUploadResponse {
    pub success: bool,
    pub message: &'static str,
    pub folder_cid: String,
    pub folder_name: String,
    pub visibility: Visibility,
    pub total_size: u64,
    pub file_count: usize,
    pub files: Vec<FolderFile>,
}

struct FolderForm {
    entries: Vec<FolderEntry>,
    visibility: Visibility,
}

/// POST /upload-folder - Add a whole folder to the local node.
///
/// Multipart fields: repeated `files`, an optional `paths_<i>` giving the
/// relative path of the i-th file (its file name otherwise) and
/// `visibility`. The folder CID wraps every uploaded path.
pub async fn upload_folder(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<FolderUploadResponse>, ApiError> {
    let form = read_folder_form(multipart).await?;

    let folder_name = folder_name(&form.entries[0].path);
    let files: Vec<FolderFile> = form
        .entries
        .iter()
        .map(|entry| FolderFile {
            path: entry.path.clone(),
            size: entry.data.len() as u64,
            content_type: guess_mime(&entry.path)
                .unwrap_or_else(|| "application/octet-stream".to_string()),
        })
        .collect();
    let total_size = files.iter().map(|f| f.size).sum();

    let folder_cid = add_folder_to_node(&state, form.entries, form.visibility).await?;
    if form.visibility == Visibility::Public {
        announce(&state, &folder_cid);
    }

    Ok(Json(FolderUploadResponse {
        success: true,
        message: "Folder uploaded successfully to IPFS",
        folder_cid,
        folder_name,
        visibility: form.visibility,
        total_size,
        file_count: files.len(),
        files,
    }))
}

#[instrument(skip(state, entries), fields(files = entries.len()))]
async fn add_folder_to_node(
    state: &AppState,
    entries: Vec<FolderEntry>,
    visibility: Visibility,
) -> Result<String, ApiError> {
    let cid = state
        .node
        .add_folder(entries, visibility)
        .await
        .map_err(|e| {
            node_failure(
                e,
                "Folder upload timeout - too many files or network slow. Please try again.",
                "Failed to add folder to IPFS",
            )
        })?;

    info!(cid = %cid, visibility = visibility.as_str(), "Folder added");
    Ok(cid)
}

/// Top-level directory of the first path, or a timestamped name when the
/// files were uploaded without one
fn folder_name(first_path: &str) -> String {
    match first_path.split_once('/') {
        Some((top, _)) => top.to_string(),
        None => {
            let secs = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default();
            format!("uploaded_folder_{}", secs)
        }
    }
}

async fn read_folder_form(mut multipart: Multipart) -> Result<FolderForm, ApiError> {
    let mut files: Vec<(String, Bytes)> = Vec::new();
    let mut paths: HashMap<usize, String> = HashMap::new();
    let mut visibility = Visibility::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "files" {
            let filename = field.file_name().unwrap_or_default().to_string();
            let data = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            files.push((filename, data));
        } else if name == "visibility" {
            visibility = read_visibility(field).await?;
        } else if let Some(index) = name
            .strip_prefix(PATH_FIELD_PREFIX)
            .and_then(|i| i.parse::<usize>().ok())
        {
            let path = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(e.to_string()))?;
            paths.insert(index, path);
        }
    }

    if files.is_empty() {
        return Err(ApiError::bad_request("No files provided"));
    }

    let mut entries: Vec<FolderEntry> = Vec::with_capacity(files.len());
    for (index, (filename, data)) in files.into_iter().enumerate() {
        if filename.is_empty() {
            continue;
        }
        let requested = paths.remove(&index).unwrap_or(filename);
        let path = normalize_relative_path(&requested)
            .ok_or_else(|| ApiError::bad_request(format!("Invalid file path: {}", requested)))?;

        // A repeated path keeps the last file sent for it
        match entries.iter_mut().find(|entry| entry.path == path) {
            Some(existing) => existing.data = data,
            None => entries.push(FolderEntry { path, data }),
        }
    }

    if entries.is_empty() {
        return Err(ApiError::bad_request("No files selected"));
    }

    Ok(FolderForm {
        entries,
        visibility,
    })
}
