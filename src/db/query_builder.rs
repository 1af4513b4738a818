//! Bounded, injection-safe listing queries.
//!
//! Every listing goes through [`QueryPlan`]: page and page size are clamped,
//! the sort key is looked up in a per-entity allow-list, and the free-text
//! search term is bound as an escaped LIKE pattern, never spliced into SQL.

use crate::config::AppConfig;
use sea_orm::sea_query::{BinOper, Expr, Func, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, ConnectionTrait, DbErr, EntityTrait, IdenStatic, Order,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Select,
};
use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

/// Page size bounds applied to every listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLimits {
    pub default_page_size: u64,
    pub max_page_size: u64,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
        }
    }
}

impl From<&AppConfig> for PageLimits {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            default_page_size: u64::from(cfg.api_default_page_size),
            max_page_size: u64::from(cfg.api_max_page_size),
        }
    }
}

impl PageLimits {
    /// `page <= 0` becomes 1, `page_size <= 0` becomes the default, and
    /// anything above the maximum is clamped down to it.
    pub fn normalize(&self, page: i64, page_size: i64) -> Pagination {
        let page = if page <= 0 { 1 } else { page as u64 };
        let page_size = if page_size <= 0 {
            self.default_page_size
        } else {
            (page_size as u64).min(self.max_page_size)
        };
        Pagination { page, page_size }
    }
}

/// Raw listing parameters as received from a caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageRequest {
    #[serde(default)]
    pub page: i64,
    #[serde(default)]
    pub page_size: i64,
    #[serde(default)]
    pub search: Option<String>,
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub sort_desc: bool,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self {
            page,
            page_size,
            ..Default::default()
        }
    }

    pub fn search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn sort(mut self, sort_by: impl Into<String>, desc: bool) -> Self {
        self.sort_by = Some(sort_by.into());
        self.sort_desc = desc;
        self
    }
}

/// Normalized page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u64,
    pub page_size: u64,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// One page of results plus the metadata needed to render page controls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, pagination: Pagination) -> Self {
        let total_pages = total.div_ceil(pagination.page_size.max(1));
        Self {
            items,
            total,
            page: pagination.page,
            page_size: pagination.page_size,
            total_pages,
            has_next: pagination.page < total_pages,
            has_prev: pagination.page > 1,
        }
    }

    /// Same page metadata around a different item list.
    pub fn with_items<U>(self, items: Vec<U>) -> Page<U> {
        Page {
            items,
            total: self.total,
            page: self.page,
            page_size: self.page_size,
            total_pages: self.total_pages,
            has_next: self.has_next,
            has_prev: self.has_prev,
        }
    }
}

/// An entity that can be listed through [`QueryPlan`].
pub trait Listable: EntityTrait {
    /// Text columns a search term is matched against, OR-combined.
    fn search_columns() -> Vec<Self::Column>;

    /// Resolves a caller-supplied sort key. Keys outside the allow-list yield `None`.
    fn sort_column(key: &str) -> Option<Self::Column>;

    fn created_at_column() -> Self::Column;

    fn id_column() -> Self::Column;
}

/// Escapes LIKE metacharacters so the term only ever matches literally.
pub fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Case-insensitive substring match of `term` against any of `columns`.
/// Blank terms produce no condition.
///
/// Both the column and the bound pattern pass through the store's `LOWER`,
/// so case folding is whatever the backend does, applied to both sides.
pub fn search_condition<C: ColumnTrait>(columns: &[C], term: &str) -> Option<Condition> {
    let term = term.trim();
    if term.is_empty() || columns.is_empty() {
        return None;
    }

    let pattern = SimpleExpr::Binary(
        Box::new(Func::lower(Expr::val(format!("%{}%", escape_like(term)))).into()),
        BinOper::Escape,
        Box::new(SimpleExpr::Constant('\\'.into())),
    );
    let condition = columns.iter().fold(Condition::any(), |any, column| {
        any.add(
            Expr::expr(Func::lower(Expr::col(*column))).binary(BinOper::Like, pattern.clone()),
        )
    });
    Some(condition)
}

/// A fully resolved listing: filter predicate, sort order, and page window.
#[derive(Debug, Clone)]
pub struct QueryPlan<E: Listable> {
    condition: Condition,
    sort_column: E::Column,
    sort_order: Order,
    pagination: Pagination,
}

impl<E: Listable> QueryPlan<E> {
    /// Combines entity filters with the request's search term (AND) and
    /// resolves sort and pagination against `limits`.
    pub fn build(filters: Condition, request: &PageRequest, limits: &PageLimits) -> Self {
        let mut condition = filters;
        if let Some(search) = request
            .search
            .as_deref()
            .and_then(|term| search_condition(&E::search_columns(), term))
        {
            condition = condition.add(search);
        }

        let (sort_column, sort_order) = match request.sort_by.as_deref().and_then(E::sort_column) {
            Some(column) if request.sort_desc => (column, Order::Desc),
            Some(column) => (column, Order::Asc),
            None => (E::created_at_column(), Order::Desc),
        };

        Self {
            condition,
            sort_column,
            sort_order,
            pagination: limits.normalize(request.page, request.page_size),
        }
    }

    pub fn pagination(&self) -> Pagination {
        self.pagination
    }

    /// Column name the results are ordered by
    pub fn sort_key(&self) -> &str {
        self.sort_column.as_str()
    }

    pub fn is_descending(&self) -> bool {
        matches!(self.sort_order, Order::Desc)
    }

    /// The filtered, ordered query without the page window.
    pub fn select(&self) -> Select<E> {
        E::find()
            .filter(self.condition.clone())
            .order_by(self.sort_column, self.sort_order.clone())
            .order_by(E::id_column(), self.sort_order.clone())
    }

    /// Counts under the same predicate, then loads the requested page.
    pub async fn fetch<C>(&self, db: &C) -> Result<Page<E::Model>, DbErr>
    where
        C: ConnectionTrait,
        E::Model: Send + Sync,
    {
        let total = E::find().filter(self.condition.clone()).count(db).await?;
        let items = self
            .select()
            .limit(self.pagination.page_size)
            .offset(self.pagination.offset())
            .all(db)
            .await?;

        Ok(Page::new(items, total, self.pagination))
    }
}
