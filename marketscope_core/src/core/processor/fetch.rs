use smallvec::SmallVec;

use crate::{
    core::{
        predicate::Predicate,
        record::Record,
        schema::{OrderBy, TableDescriptor},
    },
    source::{DataSource, SourceResult},
};

/// Bounded, stably ordered reads for list views.
pub struct PaginatedFetch<'a, S: DataSource> {
    source: &'a S,
    max_page_size: usize,
}

impl<'a, S: DataSource> PaginatedFetch<'a, S> {
    pub fn new(source: &'a S, max_page_size: usize) -> Self {
        Self {
            source,
            max_page_size: max_page_size.max(1),
        }
    }

    /// At most `limit` records (clamped to the maximum page size), always ending the
    /// ordering with the primary key so equal sort values keep a fixed order.
    pub async fn fetch(
        &self,
        table: &TableDescriptor,
        predicates: &[Predicate],
        ordering: &[OrderBy],
        limit: usize,
        offset: usize,
    ) -> SourceResult<Vec<Record>> {
        let limit = limit.min(self.max_page_size);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let ordering = stable_ordering(table, ordering);

        let mut rows = self
            .source
            .query(table, predicates, &ordering, limit, offset)
            .await?;

        rows.truncate(limit);
        Ok(rows)
    }

    /// Like [`fetch`](Self::fetch), also reporting whether any row follows the page.
    pub async fn fetch_with_lookahead(
        &self,
        table: &TableDescriptor,
        predicates: &[Predicate],
        ordering: &[OrderBy],
        limit: usize,
        offset: usize,
    ) -> SourceResult<(Vec<Record>, bool)> {
        let limit = limit.min(self.max_page_size);
        if limit == 0 {
            return Ok((Vec::new(), false));
        }

        let ordering = stable_ordering(table, ordering);

        let mut rows = self
            .source
            .query(table, predicates, &ordering, limit + 1, offset)
            .await?;

        let has_more = if rows.len() > limit {
            rows.truncate(limit);
            true
        } else if rows.len() == limit {
            // The source may cap pages at `limit`; probe the next row.
            !self
                .source
                .query(table, predicates, &ordering, 1, offset + limit)
                .await?
                .is_empty()
        } else {
            false
        };

        Ok((rows, has_more))
    }
}

pub fn stable_ordering(table: &TableDescriptor, ordering: &[OrderBy]) -> SmallVec<[OrderBy; 2]> {
    let mut stable: SmallVec<[OrderBy; 2]> = ordering.iter().cloned().collect();

    if !stable.iter().any(|order| order.field == table.primary_key) {
        stable.push(OrderBy::asc(&table.primary_key));
    }

    stable
}
