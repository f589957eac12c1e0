//! Fixed chunk-collection schema for Milvus REST.

use serde_json::{Value, json};

/// Maximum primary-key length.
pub(crate) const ID_MAX_LENGTH: u32 = 512;
/// Maximum content column length.
pub(crate) const CONTENT_MAX_LENGTH: u32 = 65_535;
/// Maximum relative-path column length.
pub(crate) const RELATIVE_PATH_MAX_LENGTH: u32 = 1_024;
/// Maximum file-extension column length.
pub(crate) const FILE_EXTENSION_MAX_LENGTH: u32 = 32;
/// Maximum metadata column length.
pub(crate) const METADATA_MAX_LENGTH: u32 = 65_535;

/// Fields returned by searches and queries.
pub(crate) const OUTPUT_FIELDS: &[&str] = &[
    "id",
    "content",
    "relativePath",
    "startLine",
    "endLine",
    "fileExtension",
    "metadata",
];

/// Build the REST schema payload for a dense chunk collection.
pub(crate) fn build_schema(dimension: u32) -> Value {
    json!({
        "autoID": false,
        "enableDynamicField": false,
        "fields": [
            {
                "fieldName": "id",
                "dataType": "VarChar",
                "isPrimary": true,
                "elementTypeParams": { "max_length": ID_MAX_LENGTH }
            },
            {
                "fieldName": "vector",
                "dataType": "FloatVector",
                "elementTypeParams": { "dim": dimension }
            },
            {
                "fieldName": "content",
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": CONTENT_MAX_LENGTH }
            },
            {
                "fieldName": "relativePath",
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": RELATIVE_PATH_MAX_LENGTH }
            },
            {
                "fieldName": "startLine",
                "dataType": "Int64"
            },
            {
                "fieldName": "endLine",
                "dataType": "Int64"
            },
            {
                "fieldName": "fileExtension",
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": FILE_EXTENSION_MAX_LENGTH }
            },
            {
                "fieldName": "metadata",
                "dataType": "VarChar",
                "elementTypeParams": { "max_length": METADATA_MAX_LENGTH }
            }
        ]
    })
}

/// Index parameters: cosine metric with an auto-selected index type.
pub(crate) fn build_index_params() -> Value {
    json!([
        {
            "fieldName": "vector",
            "indexName": "vector_index",
            "metricType": "COSINE",
            "indexType": "AUTOINDEX"
        }
    ])
}
