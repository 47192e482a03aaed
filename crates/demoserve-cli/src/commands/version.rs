use demoserve_core::version::version_string;
use miette::Result;

pub fn run(json: bool) -> Result<()> {
    if json {
        let out = serde_json::json!({
            "name": "demoserve",
            "version": demoserve_core::VERSION,
            "display": version_string(),
        });
        println!("{out}");
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
