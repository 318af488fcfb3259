//! Pagination.

use serde::Serialize;

use crate::persistence::PersistenceError;

pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Zero-based page request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: u32,
    size: u32,
    sort: Option<Sort>,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Result<Self, PersistenceError> {
        if size == 0 || size > MAX_PAGE_SIZE {
            return Err(PersistenceError::InvalidPage(format!(
                "size must be between 1 and {MAX_PAGE_SIZE}, got {size}"
            )));
        }
        Ok(Self { page, size, sort: None })
    }

    /// Sort by `field`. Only plain identifiers are accepted since the field
    /// is spliced into SQL.
    pub fn sorted_by(mut self, field: &str, direction: SortDirection) -> Result<Self, PersistenceError> {
        let valid = field
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid {
            return Err(PersistenceError::InvalidPage(format!("invalid sort field '{field}'")));
        }
        self.sort = Some(Sort {
            field: field.to_string(),
            direction,
        });
        Ok(self)
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }

    pub fn next(&self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self.clone()
        }
    }

    pub fn previous(&self) -> Option<Self> {
        self.page.checked_sub(1).map(|page| Self {
            page,
            ..self.clone()
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    content: Vec<T>,
    request: PageRequest,
    total_elements: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: PageRequest, total_elements: u64) -> Self {
        Self {
            content,
            request,
            total_elements,
        }
    }

    pub fn empty(request: PageRequest) -> Self {
        Self::new(Vec::new(), request, 0)
    }

    pub fn content(&self) -> &[T] {
        &self.content
    }

    pub fn into_content(self) -> Vec<T> {
        self.content
    }

    pub fn request(&self) -> &PageRequest {
        &self.request
    }

    pub fn total_elements(&self) -> u64 {
        self.total_elements
    }

    pub fn total_pages(&self) -> u64 {
        self.total_elements.div_ceil(u64::from(self.request.size))
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn is_first(&self) -> bool {
        self.request.page == 0
    }

    pub fn is_last(&self) -> bool {
        u64::from(self.request.page) + 1 >= self.total_pages()
    }

    pub fn has_next(&self) -> bool {
        !self.is_last()
    }

    pub fn has_previous(&self) -> bool {
        !self.is_first()
    }

    pub fn next_request(&self) -> Option<PageRequest> {
        self.has_next().then(|| self.request.next())
    }

    pub fn previous_request(&self) -> Option<PageRequest> {
        self.request.previous()
    }

    /// Convert the content, e.g. rows into models.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            content: self.content.into_iter().map(f).collect(),
            request: self.request,
            total_elements: self.total_elements,
        }
    }
}

pub(crate) fn count_sql(sql: &str) -> String {
    format!("SELECT COUNT(*) AS total FROM ({})", sql.trim().trim_end_matches(';'))
}

pub(crate) fn paged_sql(sql: &str, request: &PageRequest) -> String {
    let mut out = sql.trim().trim_end_matches(';').to_string();
    if let Some(sort) = &request.sort {
        out.push_str(&format!(" ORDER BY {} {}", sort.field, sort.direction.as_sql()));
    }
    out.push_str(" LIMIT ? OFFSET ?");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_bounds() {
        assert!(PageRequest::new(0, 0).is_err());
        assert!(PageRequest::new(0, 1001).is_err());
        assert_eq!(PageRequest::new(3, 1000).unwrap().offset(), 3000);
    }

    #[test]
    fn test_sort_field_must_be_identifier() {
        let request = PageRequest::new(0, 10).unwrap();
        assert!(request.clone().sorted_by("created_at", SortDirection::Desc).is_ok());
        assert!(request.clone().sorted_by("id; DROP TABLE USER", SortDirection::Asc).is_err());
        assert!(request.clone().sorted_by("1abc", SortDirection::Asc).is_err());
        assert!(request.sorted_by("", SortDirection::Asc).is_err());
    }

    #[test]
    fn test_page_flags() {
        let first = Page::new(vec![1, 2], PageRequest::new(0, 2).unwrap(), 5);
        assert_eq!(first.total_pages(), 3);
        assert!(first.is_first() && first.has_next() && !first.has_previous());
        assert_eq!(first.next_request().map(|r| r.page()), Some(1));

        let last = Page::new(vec![5], PageRequest::new(2, 2).unwrap(), 5);
        assert!(last.is_last());
        assert!(last.next_request().is_none());
        assert_eq!(last.previous_request().map(|r| r.page()), Some(1));

        let empty: Page<i32> = Page::empty(PageRequest::new(0, 10).unwrap());
        assert_eq!(empty.total_pages(), 0);
        assert!(empty.is_last());
    }

    #[test]
    fn test_map() {
        let page = Page::new(vec![1, 2], PageRequest::new(0, 2).unwrap(), 2).map(|n| n * 10);
        assert_eq!(page.content(), &[10, 20]);
    }

    #[test]
    fn test_sql_builders() {
        let request = PageRequest::new(1, 5).unwrap().sorted_by("name", SortDirection::Asc).unwrap();
        assert_eq!(count_sql("SELECT * FROM ROLE;"), "SELECT COUNT(*) AS total FROM (SELECT * FROM ROLE)");
        assert_eq!(paged_sql("SELECT * FROM ROLE", &request), "SELECT * FROM ROLE ORDER BY name ASC LIMIT ? OFFSET ?");
    }
}
