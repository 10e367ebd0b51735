use serde::{Serialize, Serializer};

pub const NA: &str = "NA";

/// Column order of every persisted row.
pub const SHEET_COLUMNS: [&str; 7] = [
    "name",
    "phone",
    "companyUrl",
    "isCompanyUrlValid",
    "ownerName",
    "description",
    "location",
];

const MISSING_MARKERS: [&str; 6] = ["na", "n/a", "null", "none", "unknown", "not available"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlValidity {
    Valid,
    #[default]
    Invalid,
}

impl UrlValidity {
    pub fn as_str(&self) -> &'static str {
        match self {
            UrlValidity::Valid => "valid",
            UrlValidity::Invalid => "invalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpfitterRecord {
    pub name: String,
    #[serde(serialize_with = "serialize_or_na")]
    pub phone: Option<String>,
    #[serde(serialize_with = "serialize_or_na")]
    pub contact_details: Option<String>,
    #[serde(serialize_with = "serialize_or_na")]
    pub owner_name: Option<String>,
    #[serde(serialize_with = "serialize_or_na")]
    pub description: Option<String>,
    #[serde(serialize_with = "serialize_or_na")]
    pub location: Option<String>,
    #[serde(serialize_with = "serialize_or_na")]
    pub company_url: Option<String>,
    pub is_company_url_valid: UrlValidity,
    pub city: String,
    /// Page text seen at scrape time, kept for the URL content check.
    #[serde(skip)]
    pub page_excerpt: Option<String>,
}

impl UpfitterRecord {
    pub fn new(name: &str, city: &str) -> Self {
        UpfitterRecord {
            name: name.trim().to_string(),
            phone: None,
            contact_details: None,
            owner_name: None,
            description: None,
            location: None,
            company_url: None,
            is_company_url_valid: UrlValidity::Invalid,
            city: city.to_string(),
            page_excerpt: None,
        }
    }

    /// Neither a phone nor any contact details nor a company url is known.
    pub fn is_missing_contact_and_url(&self) -> bool {
        self.phone.is_none() && self.contact_details.is_none() && self.company_url.is_none()
    }

    /// Fills only the empty slots. Returns true if anything changed.
    pub fn fill_gaps(&mut self, phone: Option<String>, company_url: Option<String>) -> bool {
        let filled_phone = fill(&mut self.phone, phone);
        let filled_url = fill(&mut self.company_url, company_url);

        filled_phone || filled_url
    }

    pub fn sheet_row(&self) -> Vec<String> {
        let phone = self.phone.as_ref().or(self.contact_details.as_ref());

        vec![
            self.name.clone(),
            or_na(phone),
            or_na(self.company_url.as_ref()),
            self.is_company_url_valid.as_str().to_string(),
            or_na(self.owner_name.as_ref()),
            or_na(self.description.as_ref()),
            or_na(self.location.as_ref()),
        ]
    }
}

/// Reads a value coming from the model, where "NA"-like strings mean unknown.
pub fn known(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| !MISSING_MARKERS.contains(&v.to_lowercase().as_str()))
}

fn fill(slot: &mut Option<String>, value: Option<String>) -> bool {
    match (slot.is_none(), known(value)) {
        (true, Some(value)) => {
            *slot = Some(value);
            true
        }
        _ => false,
    }
}

fn or_na(value: Option<&String>) -> String {
    value.cloned().unwrap_or(NA.to_string())
}

fn serialize_or_na<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or(NA))
}
