//! Maps wire DTOs (`tracker_http::wire`) onto the domain model
//! (`tracker_model`). Kept separate from the HTTP client because the wire
//! shape is the remote API's business, not the domain's.

use chrono::Utc;
use tracker_http::RemoteTask;
use tracker_model::{LinkDirection, Task, TaskLink};

/// Converts one remote task record into the domain `Task`, stamping
/// `last_sync_at` at `now`.
pub fn map_task(remote: RemoteTask, now: chrono::DateTime<Utc>) -> Task {
    let links = remote
        .links
        .into_iter()
        .filter_map(|l| {
            l.direction
                .parse::<LinkDirection>()
                .ok()
                .map(|direction| TaskLink {
                    link_type_id: l.link_type_id,
                    direction,
                    target_key: l.target_key,
                })
        })
        .collect();

    Task {
        natural_id: remote.id,
        key: remote.key,
        summary: remote.summary,
        description: remote.description,
        status: remote.status.key,
        author: remote.author,
        assignee: remote.assignee,
        team: remote.team,
        business_client: remote.business_client,
        product_team: remote.product_team,
        profit_forecast: remote.profit_forecast,
        created_at: remote.created_at,
        updated_at: remote.updated_at,
        last_sync_at: now,
        links,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_http::{RemoteLink, StatusValue};

    #[test]
    fn unparseable_link_direction_is_dropped_not_fatal() {
        let remote = RemoteTask {
            id: "1".into(),
            key: "UP-1".into(),
            summary: "s".into(),
            description: None,
            status: StatusValue {
                key: "open".into(),
                display: "Open".into(),
            },
            author: None,
            assignee: None,
            team: None,
            business_client: None,
            product_team: None,
            profit_forecast: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            links: vec![RemoteLink {
                link_type_id: "subtask".into(),
                direction: "sideways".into(),
                target_key: "DOWN-1".into(),
            }],
        };

        let task = map_task(remote, Utc::now());
        assert!(task.links.is_empty());
    }
}
