use axum::{
    Json,
    extract::{Multipart, State},
};
use tracing::warn;

use drafter_llm::prompt;
use drafter_types::api::GenerateResponse;

use crate::error::ApiError;
use crate::state::AppState;

/// Generate an API design from a text specification, an uploaded file,
/// or a follow-up question. Uploads are processed in memory; PDF and
/// plain-text files are supported, and file content supersedes the
/// specification field.
pub async fn generate(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<GenerateResponse>, ApiError> {
    let mut specification: Option<String> = None;
    let mut follow_up: Option<String> = None;
    let mut file_text: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "specification" => {
                specification = Some(field.text().await.map_err(bad_multipart)?);
            }
            "follow_up" => {
                follow_up = Some(field.text().await.map_err(bad_multipart)?);
            }
            "file" => {
                let filename = field.file_name().map(str::to_string).unwrap_or_default();
                let bytes = field.bytes().await.map_err(bad_multipart)?;
                file_text = Some(extract_file_text(&filename, &bytes)?);
            }
            _ => {}
        }
    }

    // An uploaded file supersedes the specification field, whatever order
    // the form parts arrived in.
    let specification = file_text
        .or(specification)
        .filter(|text| !text.trim().is_empty());
    let follow_up = follow_up.filter(|text| !text.trim().is_empty());
    if specification.is_none() && follow_up.is_none() {
        return Err(ApiError::InvalidInput(
            "No API specification or follow-up provided".into(),
        ));
    }

    let messages = prompt::generate_messages(specification.as_deref(), follow_up.as_deref());
    let response = state.llm.complete(messages).await?;

    Ok(Json(GenerateResponse {
        success: true,
        response,
    }))
}

fn bad_multipart(err: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::InvalidInput(format!("Malformed form upload: {err}"))
}

/// Pull plain text out of an uploaded document, judged by extension.
fn extract_file_text(filename: &str, bytes: &[u8]) -> Result<String, ApiError> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "pdf" => pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
            warn!("PDF text extraction failed: {}", e);
            ApiError::InvalidInput("Error reading file: could not extract text".into())
        }),
        "txt" => String::from_utf8(bytes.to_vec())
            .map_err(|_| ApiError::InvalidInput("Error reading file: not valid UTF-8".into())),
        _ => Err(ApiError::InvalidInput(format!(
            "Unsupported file type: .{extension}"
        ))),
    }
}
