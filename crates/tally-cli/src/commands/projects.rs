use super::Session;

pub fn list_projects(prefix: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    for project in session.tracker.list_projects(prefix) {
        println!("{project}");
    }
    session.finish()
}

pub fn list_tasks(project: &str, prefix: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let session = Session::open()?;
    for task in session.tracker.list_tasks(project, prefix) {
        println!("{task}");
    }
    session.finish()
}
