//! Translation of `Filter` selectors into SQL

use sqlx::{Postgres, QueryBuilder};
use trellis_core::{Filter, OrderBy, Selector};
use uuid::Uuid;

/// Columns a table exposes to selectors. A selector on a missing column
/// matches nothing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Columns {
    pub id: Option<&'static str>,
    pub name: Option<&'static str>,
    pub provider_id: Option<&'static str>,
    pub identity_id: Option<&'static str>,
    pub expires_at: Option<&'static str>,
    pub created_at: &'static str,
}

/// Append one `AND` clause per row selector. The builder must already hold
/// a `WHERE` clause.
pub(crate) fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter, cols: &Columns) {
    for selector in filter.selectors() {
        match selector {
            Selector::ById(id) => push_uuid_eq(qb, cols.id, *id),
            Selector::ByName(name) => match cols.name {
                Some(column) => {
                    qb.push(" AND ").push(column).push(" = ").push_bind(name.clone());
                }
                None => {
                    qb.push(" AND FALSE");
                }
            },
            Selector::ByProviderId(id) => push_uuid_eq(qb, cols.provider_id, id.into_uuid()),
            Selector::ByIdentityId(id) => push_uuid_eq(qb, cols.identity_id, id.into_uuid()),
            Selector::NotExpired => match cols.expires_at {
                Some(column) => {
                    qb.push(format!(" AND ({0} IS NULL OR {0} > now())", column));
                }
                None => {
                    qb.push(" AND FALSE");
                }
            },
            Selector::Paginate(_) | Selector::OrderBy(_) => {}
        }
    }
}

fn push_uuid_eq(qb: &mut QueryBuilder<'_, Postgres>, column: Option<&'static str>, value: Uuid) {
    match column {
        Some(column) => {
            qb.push(" AND ").push(column).push(" = ").push_bind(value);
        }
        None => {
            qb.push(" AND FALSE");
        }
    }
}

/// Append `ORDER BY` and `LIMIT`/`OFFSET`
pub(crate) fn push_window(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter, cols: &Columns) {
    let order: Vec<&'static str> = filter
        .ordering()
        .into_iter()
        .filter_map(|o| match o {
            OrderBy::Name => cols.name,
            OrderBy::CreatedAt => Some(cols.created_at),
        })
        .collect();

    if !order.is_empty() {
        qb.push(" ORDER BY ").push(order.join(", "));
    }

    if let Some(page) = filter.pagination().filter(|p| !p.is_unbounded()) {
        qb.push(" LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(i64::try_from(page.offset()).unwrap_or(i64::MAX));
    }
}
