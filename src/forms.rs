use std::{borrow::Cow, collections::BTreeMap, fmt, str::FromStr};

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use utoipa::ToSchema;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{NewPost, PostSummary, ProfileUpdate, User};

const REQUIRED: &str = "This field is required.";

// --- Form Payloads (application/x-www-form-urlencoded) ---

/// PostForm
///
/// Create/edit form for a post. Every field is optional on the wire so that a
/// missing value becomes a field error instead of an extractor rejection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema, Default)]
pub struct PostForm {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 256, message = "Title must be between 1 and 256 characters."))]
    pub title: String,

    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, message = "This field is required."))]
    pub text: String,

    /// RFC 3339, or the `YYYY-MM-DDTHH:MM` value of an HTML datetime-local input (read as UTC).
    /// Kept raw so that a malformed value is reported on the form.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(required(message = "This field is required."))]
    pub pub_date: Option<String>,

    /// Category id, raw for the same reason.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(required(message = "This field is required."))]
    pub category: Option<String>,

    /// Object key returned by the upload endpoint.
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub image: Option<String>,

    #[serde(default, deserialize_with = "checkbox")]
    pub is_published: bool,
}

impl PostForm {
    /// The unbound form shown on the create page. New posts are published by default.
    pub fn blank() -> Self {
        Self {
            is_published: true,
            ..Self::default()
        }
    }

    pub fn from_post(post: &PostSummary) -> Self {
        Self {
            title: post.title.clone(),
            text: post.text.clone(),
            pub_date: Some(post.pub_date.to_rfc3339_opts(SecondsFormat::Secs, true)),
            category: Some(post.category_id.to_string()),
            image: post.image.clone(),
            is_published: post.is_published,
        }
    }

    /// Validates the form and yields the fields to persist. Every field problem,
    /// unparseable values included, is collected into one set of errors.
    pub fn clean(&self) -> Result<NewPost, ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_else(ValidationErrors::new);

        let pub_date = self.pub_date.as_deref().and_then(|raw| {
            let parsed = parse_form_datetime(raw);
            if parsed.is_none() {
                errors.add("pub_date", invalid("invalid", "Enter a valid date/time."));
            }
            parsed
        });
        let category_id = self.category.as_deref().and_then(|raw| {
            let parsed = raw.parse::<i64>().ok();
            if parsed.is_none() {
                errors.add("category", invalid("invalid_choice", "Select a valid choice."));
            }
            parsed
        });

        if !errors.errors().is_empty() {
            return Err(errors);
        }
        let (Some(pub_date), Some(category_id)) = (pub_date, category_id) else {
            return Err(field_error("pub_date", "required", REQUIRED));
        };

        Ok(NewPost {
            title: self.title.clone(),
            text: self.text.clone(),
            pub_date,
            is_published: self.is_published,
            category_id,
            image: self.image.clone(),
        })
    }
}

/// CommentForm
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema, Default)]
pub struct CommentForm {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, message = "This field is required."))]
    pub text: String,
}

/// ProfileForm
///
/// The fields a user may change on their own profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate, ToSchema, Default)]
pub struct ProfileForm {
    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(min = 1, max = 150, message = "Username must be between 1 and 150 characters."))]
    pub username: String,

    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(max = 150))]
    pub first_name: String,

    #[serde(default, deserialize_with = "trimmed")]
    #[validate(length(max = 150))]
    pub last_name: String,

    #[serde(default, deserialize_with = "empty_string_as_none")]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
}

impl ProfileForm {
    pub fn from_user(user: &User) -> Self {
        Self {
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            email: (!user.email.is_empty()).then(|| user.email.clone()),
        }
    }

    pub fn clean(&self) -> Result<ProfileUpdate, ValidationErrors> {
        self.validate()?;
        Ok(ProfileUpdate {
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone().unwrap_or_default(),
        })
    }
}

// --- Rendering ---

/// FormView
///
/// A form as handed to a template: the submitted (or initial) values and the
/// messages attached to each invalid field.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FormView<T> {
    pub data: T,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl<T> FormView<T> {
    pub fn unbound(data: T) -> Self {
        Self {
            data,
            errors: BTreeMap::new(),
        }
    }

    pub fn with_errors(data: T, errors: &ValidationErrors) -> Self {
        let errors = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let messages = errs
                    .iter()
                    .map(|e| match &e.message {
                        Some(message) => message.to_string(),
                        None => e.code.to_string(),
                    })
                    .collect();
                (field.to_string(), messages)
            })
            .collect();
        Self { data, errors }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// A single-field validation failure, for checks that need the store
/// (unknown category, taken username).
pub fn field_error(field: &'static str, code: &'static str, message: &'static str) -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(field, invalid(code, message));
    errors
}

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

// --- Field deserializers ---

fn trimmed<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(de)?;
    Ok(value.map(|s| s.trim().to_string()).unwrap_or_default())
}

fn empty_string_as_none<'de, D, T>(de: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let value = Option::<String>::deserialize(de)?;
    match value.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse::<T>().map(Some).map_err(de::Error::custom),
    }
}

/// RFC 3339 first, then the formats HTML date/time inputs submit (read as UTC).
pub fn parse_form_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

// An HTML checkbox is either absent or carries "on".
fn checkbox<'de, D>(de: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(de)?;
    Ok(matches!(
        value.as_deref().map(str::trim),
        Some("on" | "true" | "1" | "yes")
    ))
}
