use std::env;

#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub backend_url: String,
    pub api_key: String,
    /// Server-side folder the merge operates on.
    pub merge_folder: String,
    /// Context layers fetched on startup: (name, endpoint path).
    pub background_layers: Vec<(String, String)>,
}

impl DashboardConfig {
    pub fn from_env() -> Self {
        let backend_url = env::var("DASHBOARD_BACKEND_URL")
            .unwrap_or_else(|_| "http://localhost:5000".to_string());
        let api_key = env::var("DASHBOARD_API_KEY").unwrap_or_default();
        let merge_folder =
            env::var("DASHBOARD_MERGE_FOLDER").unwrap_or_else(|_| "Uploads/input".to_string());

        Self {
            backend_url,
            api_key,
            merge_folder,
            background_layers: vec![
                ("restricted".to_string(), "/api/restricted".to_string()),
                ("zones".to_string(), "/api/zones".to_string()),
                ("layers".to_string(), "/api/layers".to_string()),
            ],
        }
    }
}
