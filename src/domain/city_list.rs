use serde_json::Value;

#[derive(Debug, PartialEq, thiserror::Error)]
pub enum CityListError {
    #[error("An array of cities is required.")]
    Missing,
    #[error("`cities` must be an array of city names.")]
    NotAList,
    #[error("Please provide a non-empty array of cities")]
    Empty,
    #[error("City at position {0} is not a non-empty string.")]
    InvalidEntry(usize),
}

/// A validated, non-empty list of city names from an inbound request.
#[derive(Debug, Clone, PartialEq)]
pub struct CityList(Vec<String>);

impl CityList {
    pub fn parse(body: &Value) -> Result<Self, CityListError> {
        let cities = match body.get("cities") {
            None | Some(Value::Null) => return Err(CityListError::Missing),
            Some(Value::Array(cities)) => cities,
            Some(_) => return Err(CityListError::NotAList),
        };

        if cities.is_empty() {
            return Err(CityListError::Empty);
        }

        cities
            .iter()
            .enumerate()
            .map(|(i, city)| match city.as_str().map(str::trim) {
                Some(city) if !city.is_empty() => Ok(city.to_string()),
                _ => Err(CityListError::InvalidEntry(i)),
            })
            .collect::<Result<Vec<String>, CityListError>>()
            .map(CityList)
    }

    pub fn into_inner(self) -> Vec<String> {
        self.0
    }
}
