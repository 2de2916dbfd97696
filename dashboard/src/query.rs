use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// User-editable table controls. `page` is 1-based like the pager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryState {
    pub filter_field: String,
    pub filter_value: String,
    pub sort_field: String,
    pub sort_direction: Option<SortDirection>,
    pub page: u32,
    pub page_size: u32,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            filter_field: String::new(),
            filter_value: String::new(),
            sort_field: String::new(),
            sort_direction: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl QueryState {
    pub fn to_query(&self) -> PageQuery {
        PageQuery {
            page_index: self.page.saturating_sub(1),
            page_size: self.page_size,
            filter_field: self.filter_field.trim().to_string(),
            filter_value: self.filter_value.trim().to_string(),
            sort_field: self.sort_field.trim().to_string(),
            sort_direction: self.sort_direction,
        }
    }
}

/// Frozen request parameters for one page fetch. `page_index` is 0-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub page_index: u32,
    pub page_size: u32,
    pub filter_field: String,
    pub filter_value: String,
    pub sort_field: String,
    pub sort_direction: Option<SortDirection>,
}

impl PageQuery {
    /// The 1-based page this query asks for.
    pub fn page(&self) -> u32 {
        self.page_index + 1
    }

    /// The active filter, when both field and value are set.
    pub fn filter(&self) -> Option<(&str, &str)> {
        if self.filter_field.is_empty() || self.filter_value.is_empty() {
            None
        } else {
            Some((self.filter_field.as_str(), self.filter_value.as_str()))
        }
    }

    /// Wire parameters in a stable order: paging, filter, sort.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("pageNumber".to_string(), self.page_index.to_string()),
            ("pageSize".to_string(), self.page_size.to_string()),
        ];

        if let Some((field, value)) = self.filter() {
            params.push((field.to_string(), value.to_string()));
        }

        if let Some(direction) = self.sort_direction {
            let sort_by = if !self.sort_field.is_empty() {
                Some(self.sort_field.as_str())
            } else if !self.filter_field.is_empty() {
                Some(self.filter_field.as_str())
            } else {
                None
            };
            if let Some(sort_by) = sort_by {
                params.push(("sortBy".to_string(), sort_by.to_string()));
            }
            params.push(("sortDirection".to_string(), direction.as_str().to_string()));
        }

        params
    }
}
