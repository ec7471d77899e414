//! Shared API types for the propdesk listing backend.
//!
//! This crate is the single source of truth for request/response shapes
//! consumed by the client. TypeScript declarations can be generated with the
//! `ts` feature:
//!   cargo test -p propdesk-api --features ts -- export_typescript --nocapture

use serde::{Deserialize, Serialize};

pub mod error;
pub mod token;

pub use error::NormalizedError;
pub use propdesk_core::{MergeOptions, PendingMutation, Record};
pub use token::AuthUser;

// ─── Resources ───────────────────────────────────────────────────────────────

/// REST resources exposed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub enum Resource {
    Property,
    Owner,
    PropertyImage,
    PropertyTrace,
}

impl Resource {
    /// Path relative to the API prefix.
    pub fn path(&self) -> &'static str {
        match self {
            Self::Property => "/property",
            Self::Owner => "/owner",
            Self::PropertyImage => "/propertyImage",
            Self::PropertyTrace => "/propertyTrace",
        }
    }

    /// Identity field of this resource's records.
    pub fn id_key(&self) -> &'static str {
        match self {
            Self::Property => "idProperty",
            Self::Owner => "idOwner",
            Self::PropertyImage => "idPropertyImage",
            Self::PropertyTrace => "idPropertyTrace",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Property => "property",
            Self::Owner => "owner",
            Self::PropertyImage => "propertyImage",
            Self::PropertyTrace => "propertyTrace",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Auth ────────────────────────────────────────────────────────────────────

/// Email + password login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Body returned by the login and refresh endpoints.
///
/// Older deployments answer with `token`, newer ones with `accessToken`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct TokenResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl TokenResponse {
    /// The issued token, whichever field carried it.
    pub fn into_token(self) -> Option<String> {
        self.token
            .or(self.access_token)
            .filter(|token| !token.trim().is_empty())
    }
}

// ─── Listing ─────────────────────────────────────────────────────────────────

/// Query string of the paginated list endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    /// Ask the backend to bypass its list cache.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub refresh: bool,
}

impl ListQuery {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.max(1),
            refresh: false,
        }
    }

    pub fn refreshed(mut self) -> Self {
        self.refresh = true;
        self
    }
}

/// Pagination metadata of a list response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PageMeta {
    #[serde(alias = "lastPage")]
    pub last_page: u32,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Raw list response: the `{ data, meta }` envelope or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    Paged {
        data: Vec<T>,
        #[serde(default)]
        meta: Option<PageMeta>,
    },
    Bare(Vec<T>),
}

/// One page of records with its metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListPage<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> ListResponse<T> {
    /// Resolve into a page, synthesizing metadata when the backend sent none.
    pub fn into_page(self, query: &ListQuery) -> ListPage<T> {
        let (data, meta) = match self {
            Self::Paged { data, meta } => (data, meta),
            Self::Bare(data) => (data, None),
        };
        let meta = meta.unwrap_or_else(|| PageMeta {
            last_page: query.page,
            page: query.page,
            limit: query.limit,
            total: data.len() as u64,
        });
        ListPage { data, meta }
    }
}

// ─── Domain records ──────────────────────────────────────────────────────────

/// A listed property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Property {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_property: Option<i64>,
    pub name: String,
    pub address: String,
    pub price: f64,
    #[serde(default)]
    pub code_internal: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub id_owner: Option<i64>,
    /// Cover image URL, filled in by the list endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Owner of one or more properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct Owner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_owner: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub photo: Option<String>,
    /// ISO-8601 date.
    #[serde(default)]
    pub birthday: Option<String>,
}

/// An image attached to a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PropertyImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_property_image: Option<i64>,
    pub id_property: i64,
    pub file: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// A recorded sale of a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[cfg_attr(feature = "ts", ts(export))]
pub struct PropertyTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_property_trace: Option<i64>,
    pub id_property: i64,
    /// ISO-8601 date of the sale.
    pub date_sale: String,
    pub name: String,
    pub value: f64,
    pub tax: f64,
}

fn default_true() -> bool {
    true
}

/// Convert a typed record into the loose shape the list view works with.
pub fn to_record<T: Serialize>(value: &T) -> Result<Record, serde_json::Error> {
    match serde_json::to_value(value)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(serde::ser::Error::custom(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn token_response_accepts_both_field_names() {
        let a: TokenResponse = serde_json::from_value(json!({"token": "t1"})).unwrap();
        let b: TokenResponse = serde_json::from_value(json!({"accessToken": "t2"})).unwrap();
        let c: TokenResponse = serde_json::from_value(json!({"token": ""})).unwrap();
        assert_eq!(a.into_token().as_deref(), Some("t1"));
        assert_eq!(b.into_token().as_deref(), Some("t2"));
        assert_eq!(c.into_token(), None);
    }

    #[test]
    fn list_response_envelope_and_bare_array() {
        let query = ListQuery::new(2, 10);

        let paged: ListResponse<Record> = serde_json::from_value(json!({
            "data": [{"idProperty": 1}],
            "meta": {"last_page": 4, "page": 2, "limit": 10, "total": 31}
        }))
        .unwrap();
        let page = paged.into_page(&query);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.meta.last_page, 4);
        assert_eq!(page.meta.total, 31);

        let bare: ListResponse<Record> =
            serde_json::from_value(json!([{"idProperty": 1}, {"idProperty": 2}])).unwrap();
        let page = bare.into_page(&query);
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.meta.page, 2);
        assert_eq!(page.meta.total, 2);
    }

    #[test]
    fn list_query_serializes_refresh_only_when_set() {
        let plain = serde_json::to_value(ListQuery::new(1, 10)).unwrap();
        assert_eq!(plain, json!({"page": 1, "limit": 10}));
        let refreshed = serde_json::to_value(ListQuery::new(0, 10).refreshed()).unwrap();
        assert_eq!(refreshed, json!({"page": 1, "limit": 10, "refresh": true}));
    }

    #[test]
    fn typed_property_converts_to_record() {
        let property = Property {
            id_property: Some(7),
            name: "Casa Azul".into(),
            address: "Calle 1".into(),
            price: 250_000.0,
            code_internal: Some("CA-7".into()),
            year: Some(1998),
            id_owner: Some(3),
            image: None,
        };
        let record = to_record(&property).unwrap();
        assert_eq!(record["idProperty"], json!(7));
        assert_eq!(record["codeInternal"], json!("CA-7"));
        assert!(!record.contains_key("image"));
    }

    #[test]
    fn resources_map_to_paths_and_id_keys() {
        assert_eq!(Resource::Property.path(), "/property");
        assert_eq!(Resource::Owner.id_key(), "idOwner");
        assert_eq!(Resource::PropertyTrace.to_string(), "propertyTrace");
    }
}

// ─── TypeScript generation ───────────────────────────────────────────────────

#[cfg(all(test, feature = "ts"))]
mod ts_export {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;
    use ts_rs::TS;

    /// Run with: cargo test -p propdesk-api --features ts -- export_typescript --nocapture
    #[test]
    fn export_typescript() {
        let out_dir =
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/api-types.generated.ts");

        let cfg = ts_rs::Config::new().with_large_int("number");
        let mut parts: Vec<String> = Vec::new();
        parts.push("// AUTO-GENERATED by propdesk-api - DO NOT EDIT".to_string());
        parts.push(String::new());

        macro_rules! collect_ts {
            ($($t:ty),+ $(,)?) => {
                $(
                    let decl = <$t>::decl(&cfg);
                    let decl = if decl.contains(" = {") {
                        decl
                            .replacen("type ", "export interface ", 1)
                            .replace(" = {", " {")
                            .trim_end_matches(';')
                            .to_string()
                    } else {
                        decl
                            .replacen("type ", "export type ", 1)
                            .trim_end_matches(';')
                            .to_string()
                    };
                    parts.push(decl);
                    parts.push(String::new());
                )+
            };
        }

        collect_ts!(
            Resource,
            LoginRequest,
            TokenResponse,
            ListQuery,
            PageMeta,
            Property,
            Owner,
            PropertyImage,
            PropertyTrace,
            AuthUser,
            NormalizedError,
        );

        if let Some(parent) = out_dir.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let mut file = std::fs::File::create(&out_dir)
            .unwrap_or_else(|e| panic!("Failed to create {}: {}", out_dir.display(), e));
        file.write_all(parts.join("\n").as_bytes())
            .unwrap_or_else(|e| panic!("Failed to write {}: {}", out_dir.display(), e));

        println!("Generated TypeScript types at: {}", out_dir.display());
    }
}
