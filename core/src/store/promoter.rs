use super::{NetworkStore, PromoterRow};
use crate::{error::CommissionResult, types::PromoterId};
use rusqlite::{params, Connection, OptionalExtension};

impl NetworkStore {
    // ── Promoter ──────────────────────────────────────────────────

    pub fn insert_promoter(&self, p: &PromoterRow) -> CommissionResult<()> {
        self.conn.execute(
            "INSERT INTO promoter (promoter_id, parent_promoter_id, name, pins, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                p.promoter_id,
                p.parent_promoter_id,
                p.name,
                p.pins,
                p.status,
                p.created_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_promoter(&self, promoter_id: &str) -> CommissionResult<Option<PromoterRow>> {
        let row = self
            .conn
            .query_row(
                "SELECT promoter_id, parent_promoter_id, name, pins, status, created_at
                 FROM promoter WHERE promoter_id = ?1",
                params![promoter_id],
                |row| {
                    Ok(PromoterRow {
                        promoter_id: row.get(0)?,
                        parent_promoter_id: row.get(1)?,
                        name: row.get(2)?,
                        pins: row.get(3)?,
                        status: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn all_promoter_ids(&self) -> CommissionResult<Vec<PromoterId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT promoter_id FROM promoter ORDER BY created_at ASC, promoter_id ASC")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Plain row write. Cycle prevention belongs to the caller.
    pub fn update_promoter_parent(
        &self,
        promoter_id: &str,
        parent_promoter_id: Option<&str>,
    ) -> CommissionResult<()> {
        self.conn.execute(
            "UPDATE promoter SET parent_promoter_id = ?1 WHERE promoter_id = ?2",
            params![parent_promoter_id, promoter_id],
        )?;
        Ok(())
    }

    /// `Some(parent)` when the promoter exists, `None` when it does not.
    pub fn promoter_parent(&self, promoter_id: &str) -> CommissionResult<Option<Option<PromoterId>>> {
        promoter_parent_on(&self.conn, promoter_id)
    }
}

pub(super) fn promoter_parent_on(
    conn: &Connection,
    promoter_id: &str,
) -> CommissionResult<Option<Option<PromoterId>>> {
    let parent = conn
        .query_row(
            "SELECT parent_promoter_id FROM promoter WHERE promoter_id = ?1",
            params![promoter_id],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()?;
    Ok(parent)
}
