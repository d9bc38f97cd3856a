//! PRD and link row access

use eyre::Result;
use workstore::Store;

use crate::domain::{Prd, PrdLink};

pub fn insert_prd(store: &mut Store, prd: &Prd) -> Result<()> {
    store.execute(
        "INSERT INTO prds (id, title, success_criteria, constraints, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        &[
            prd.id.as_str().into(),
            prd.title.as_str().into(),
            serde_json::to_string(&prd.success_criteria)?.into(),
            serde_json::to_string(&prd.constraints)?.into(),
            prd.created_at.into(),
        ],
    )?;
    Ok(())
}

pub fn get_prd(store: &mut Store, id: &str) -> Result<Option<Prd>> {
    let row = store.query_one(
        "SELECT id, title, success_criteria, constraints, created_at FROM prds WHERE id = ?1",
        &[id.into()],
    )?;
    row.map(|r| {
        Ok::<_, eyre::Report>(Prd {
            id: r.text("id")?,
            title: r.text("title")?,
            success_criteria: serde_json::from_str(&r.text("success_criteria")?)?,
            constraints: serde_json::from_str(&r.text("constraints")?)?,
            created_at: r.integer("created_at")?,
        })
    })
    .transpose()
}

pub fn insert_link(store: &mut Store, link: &PrdLink) -> Result<()> {
    store.execute(
        "INSERT INTO prd_links (id, prd_id, task_id, link_type, requirement_ref, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        &[
            link.id.as_str().into(),
            link.prd_id.as_str().into(),
            link.task_id.as_str().into(),
            link.link_type.as_str().into(),
            link.requirement_ref.clone().into(),
            link.created_at.into(),
        ],
    )?;
    Ok(())
}

pub fn links_for_prd(store: &mut Store, prd_id: &str) -> Result<Vec<PrdLink>> {
    let rows = store.query(
        "SELECT id, prd_id, task_id, link_type, requirement_ref, created_at \
         FROM prd_links WHERE prd_id = ?1 ORDER BY created_at",
        &[prd_id.into()],
    )?;
    rows.iter()
        .map(|r| {
            Ok(PrdLink {
                id: r.text("id")?,
                prd_id: r.text("prd_id")?,
                task_id: r.text("task_id")?,
                link_type: r.text("link_type")?,
                requirement_ref: r.opt_text("requirement_ref")?,
                created_at: r.integer("created_at")?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::calculate_coverage;

    #[test]
    fn test_prd_roundtrip() {
        let mut store = Store::open_in_memory().unwrap();
        let mut prd = Prd::new("Auth");
        prd.success_criteria = vec!["login".into(), "logout".into()];
        prd.constraints = vec!["fast".into()];
        insert_prd(&mut store, &prd).unwrap();

        let loaded = get_prd(&mut store, &prd.id).unwrap().unwrap();
        assert_eq!(loaded.success_criteria.len(), 2);
        assert_eq!(loaded.constraints, vec!["fast".to_string()]);
    }

    #[test]
    fn test_links_and_coverage_through_store() {
        let mut store = Store::open_in_memory().unwrap();
        let mut prd = Prd::new("Auth");
        prd.success_criteria = vec!["login".into(), "logout".into()];
        prd.constraints = vec!["fast".into()];
        insert_prd(&mut store, &prd).unwrap();

        insert_link(
            &mut store,
            &PrdLink::new(&prd.id, "t-1", "implements").with_requirement("success_criteria[0]"),
        )
        .unwrap();
        insert_link(
            &mut store,
            &PrdLink::new(&prd.id, "t-2", "tests").with_requirement("constraints[0]"),
        )
        .unwrap();

        let links = links_for_prd(&mut store, &prd.id).unwrap();
        let coverage = calculate_coverage(&prd, &links);
        assert_eq!(coverage.total_requirements, 3);
        assert_eq!(coverage.covered_requirements, 2);
        assert_eq!(coverage.coverage_percent, 67);
    }
}
