//! Sample projects loaded into an empty store at startup.

use bigdecimal::BigDecimal;
use pms_core::ProjectTaskStatus::{Blocked, Completed, InProgress, NotStarted};
use pms_core::{Project, ProjectTask, ProjectTaskStatus};
use pms_storage::{DynProjectStore, ProjectStore, StorageResult, UnitOfWork};
use time::{Duration, OffsetDateTime};
use uuid::{Uuid, uuid};

pub const OWNER_1: Uuid = uuid!("11111111-1111-1111-1111-111111111111");
pub const OWNER_2: Uuid = uuid!("22222222-2222-2222-2222-222222222222");
pub const OWNER_3: Uuid = uuid!("33333333-3333-3333-3333-333333333333");

const USERS: [Uuid; 6] = [
    uuid!("44444444-4444-4444-4444-444444444444"),
    uuid!("55555555-5555-5555-5555-555555555555"),
    uuid!("66666666-6666-6666-6666-666666666666"),
    uuid!("77777777-7777-7777-7777-777777777777"),
    uuid!("aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa"),
    uuid!("bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb"),
];

struct SeedProject {
    name: &'static str,
    description: &'static str,
    owner: Uuid,
    months_ago: i64,
    ended_months_ago: Option<i64>,
    budget: i64,
    currency: &'static str,
    tasks: &'static [(&'static str, ProjectTaskStatus)],
}

const PROJECTS: [SeedProject; 5] = [
    SeedProject {
        name: "E-Commerce Platform Redesign",
        description: "Complete overhaul of the existing e-commerce platform with modern UI/UX and improved performance",
        owner: OWNER_1,
        months_ago: 6,
        ended_months_ago: None,
        budget: 150_000,
        currency: "USD",
        tasks: &[
            ("Design new product catalog UI", Completed),
            ("Implement shopping cart functionality", InProgress),
            ("Integrate payment gateway", NotStarted),
            ("Setup inventory management system", InProgress),
            ("Develop order management dashboard", InProgress),
            ("Implement search and filtering", NotStarted),
        ],
    },
    SeedProject {
        name: "Fitness Tracking Mobile App",
        description: "Cross-platform mobile application for tracking workouts, nutrition and health metrics",
        owner: OWNER_2,
        months_ago: 8,
        ended_months_ago: None,
        budget: 80_000,
        currency: "USD",
        tasks: &[
            ("Setup React Native project", Completed),
            ("Implement user authentication", Completed),
            ("Build workout tracking feature", InProgress),
            ("Integrate health metrics API", Blocked),
            ("Design nutrition tracking interface", InProgress),
            ("Implement social features", NotStarted),
        ],
    },
    SeedProject {
        name: "Legacy System Data Migration",
        description: "Migrate customer and order data from the legacy system to the new platform",
        owner: OWNER_3,
        months_ago: 4,
        ended_months_ago: Some(1),
        budget: 50_000,
        currency: "EUR",
        tasks: &[
            ("Analyze legacy database schema", Completed),
            ("Design new database schema", Completed),
            ("Develop ETL pipeline", Completed),
            ("Execute data migration", Completed),
        ],
    },
    SeedProject {
        name: "Company Analytics Dashboard",
        description: "Internal dashboard for real-time business analytics and reporting",
        owner: OWNER_1,
        months_ago: 3,
        ended_months_ago: None,
        budget: 35_000,
        currency: "USD",
        tasks: &[
            ("Gather requirements from stakeholders", Completed),
            ("Setup data warehouse connection", InProgress),
            ("Create dashboard wireframes", Completed),
            ("Implement real-time data updates", InProgress),
            ("Build sales performance widgets", NotStarted),
        ],
    },
    SeedProject {
        name: "REST API for Partner Integration",
        description: "Public REST API allowing partners to integrate with the order pipeline",
        owner: OWNER_2,
        months_ago: 5,
        ended_months_ago: None,
        budget: 65_000,
        currency: "USD",
        tasks: &[
            ("Define API contracts", Completed),
            ("Implement authentication for partners", InProgress),
            ("Write integration documentation", NotStarted),
        ],
    },
];

fn months_before(now: OffsetDateTime, months: i64) -> OffsetDateTime {
    now - Duration::days(30 * months)
}

/// Builds the sample projects relative to `now`.
pub fn sample_projects(now: OffsetDateTime) -> Vec<Project> {
    PROJECTS
        .iter()
        .map(|seed| {
            let id = Uuid::new_v4();
            let created_at = months_before(now, seed.months_ago);
            let tasks = seed
                .tasks
                .iter()
                .enumerate()
                .map(|(i, (title, status))| ProjectTask {
                    id: Uuid::new_v4(),
                    title: (*title).to_string(),
                    description: None,
                    project_id: id,
                    assigned_user_id: USERS[i % USERS.len()],
                    status: *status,
                    created_at: created_at + Duration::days(7 * i as i64),
                })
                .collect();

            Project {
                id,
                name: seed.name.to_string(),
                description: Some(seed.description.to_string()),
                owner_id: seed.owner,
                created_at,
                expected_start_date: created_at,
                actual_end_date: seed.ended_months_ago.map(|m| months_before(now, m)),
                budget: BigDecimal::from(seed.budget),
                currency: Some(seed.currency.to_string()),
                tasks,
            }
        })
        .collect()
}

/// Loads the sample projects unless the store already holds data.
///
/// Returns the number of persisted entities (projects plus tasks).
pub async fn seed_if_empty(store: &DynProjectStore) -> StorageResult<usize> {
    if store.project_count().await? > 0 {
        tracing::debug!("store already populated, skipping seed");
        return Ok(0);
    }

    let mut uow = UnitOfWork::new(store.clone());
    for project in sample_projects(OffsetDateTime::now_utc()) {
        uow.add_project(project);
    }
    let persisted = uow.save().await?;
    tracing::info!(persisted, "seeded sample projects");
    Ok(persisted)
}
