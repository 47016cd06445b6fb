use serde_json::{Map, Value};
use crate::core::errors::ApiError;

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 0, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
        validate_u64_field(
            server,
            "server.chatbot_requests_per_minute",
            "chatbot_requests_per_minute",
            1,
            100_000,
        )?;
    }

    if let Some(llm) = expect_optional_object(root, "llm")? {
        validate_optional_string_field(llm, "llm.base_url", "base_url")?;
        validate_string_array_field(llm, "llm.models", "models")?;
        if let Some(models) = llm.get("models").and_then(|v| v.as_array()) {
            if models.is_empty() {
                return Err(ApiError::BadRequest(
                    "Invalid config at 'llm.models': at least one model is required".to_string(),
                ));
            }
        }
        validate_f64_field(llm, "llm.temperature", "temperature", 0.0, 2.0)?;
        validate_u64_field(
            llm,
            "llm.max_output_tokens",
            "max_output_tokens",
            1,
            65_536,
        )?;
        validate_u64_field(
            llm,
            "llm.request_timeout_secs",
            "request_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(embedding) = expect_optional_object(root, "embedding")? {
        validate_optional_string_field(embedding, "embedding.base_url", "base_url")?;
        validate_optional_string_field(embedding, "embedding.model", "model")?;
        validate_u64_field(embedding, "embedding.dimension", "dimension", 1, 65_536)?;
        validate_u64_field(embedding, "embedding.batch_size", "batch_size", 1, 1_024)?;
        validate_u64_field(embedding, "embedding.concurrency", "concurrency", 1, 64)?;
        validate_u64_field(
            embedding,
            "embedding.request_timeout_secs",
            "request_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(index) = expect_optional_object(root, "vector_index")? {
        if let Some(provider) = index.get("provider") {
            match provider.as_str() {
                Some("pinecone") | Some("sqlite") => {}
                _ => {
                    return Err(ApiError::BadRequest(
                        "Invalid config at 'vector_index.provider': expected 'pinecone' or 'sqlite'"
                            .to_string(),
                    ))
                }
            }
        }
        validate_optional_string_field(index, "vector_index.index_name", "index_name")?;
        validate_optional_string_field(
            index,
            "vector_index.control_plane_url",
            "control_plane_url",
        )?;
        validate_optional_string_field(index, "vector_index.cloud", "cloud")?;
        validate_optional_string_field(index, "vector_index.region", "region")?;
        validate_optional_string_field(index, "vector_index.sqlite_path", "sqlite_path")?;
        validate_u64_field(
            index,
            "vector_index.ready_timeout_secs",
            "ready_timeout_secs",
            0,
            3_600,
        )?;
        validate_u64_field(
            index,
            "vector_index.request_timeout_secs",
            "request_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(rag) = expect_optional_object(root, "rag")? {
        validate_u64_field(rag, "rag.chunk_size", "chunk_size", 1, 100_000)?;
        validate_u64_field(rag, "rag.chunk_overlap", "chunk_overlap", 0, 99_999)?;
        validate_u64_field(rag, "rag.top_k", "top_k", 1, 100)?;
        validate_u64_field(rag, "rag.ask_timeout_secs", "ask_timeout_secs", 1, 3_600)?;
        validate_optional_string_field(rag, "rag.data_dir", "data_dir")?;

        let chunk_size = rag.get("chunk_size").and_then(|v| v.as_u64()).unwrap_or(500);
        let overlap = rag.get("chunk_overlap").and_then(|v| v.as_u64()).unwrap_or(20);
        if overlap >= chunk_size {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at 'rag.chunk_overlap': must be smaller than rag.chunk_size ({})",
                chunk_size
            )));
        }
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() {
        return Ok(());
    }
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_empty_and_default_like_configs() {
        assert!(validate_config(&json!({})).is_ok());
        assert!(validate_config(&json!({
            "rag": { "chunk_size": 500, "chunk_overlap": 20, "top_k": 3 },
            "vector_index": { "provider": "pinecone", "index_name": "healthcare-medicalbot" },
            "llm": { "models": ["gemini-1.5-flash"], "temperature": 0.4 }
        }))
        .is_ok());
    }

    #[test]
    fn rejects_non_object_sections() {
        let err = validate_config(&json!({ "rag": 3 })).unwrap_err();
        assert!(err.to_string().contains("'rag': expected object"));
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = validate_config(&json!({ "rag": { "top_k": 0 } })).unwrap_err();
        assert!(err.to_string().contains("rag.top_k"));

        let err = validate_config(&json!({ "llm": { "temperature": 3.5 } })).unwrap_err();
        assert!(err.to_string().contains("llm.temperature"));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let err = validate_config(&json!({ "rag": { "chunk_size": 20 } })).unwrap_err();
        assert!(err.to_string().contains("rag.chunk_overlap"));
    }

    #[test]
    fn rejects_unknown_index_provider_and_empty_model_list() {
        assert!(validate_config(&json!({ "vector_index": { "provider": "chroma" } })).is_err());
        assert!(validate_config(&json!({ "llm": { "models": [] } })).is_err());
    }
}
