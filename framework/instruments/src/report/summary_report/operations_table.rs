use tabled::Tabled;

#[derive(Tabled)]
pub struct OperationRow {
    pub operation_id: String,
    pub total_operations: u64,
    pub failed_operations: u64,
    #[tabled(display = "float2")]
    pub avg_time_ms: f64,
    #[tabled(display = "float2")]
    pub min_time_ms: f64,
    #[tabled(display = "float2")]
    pub max_time_ms: f64,
    #[tabled(display = "float2")]
    pub p95_time_ms: f64,
    #[tabled(display = "float2")]
    pub p99_time_ms: f64,
}

#[derive(Tabled)]
pub struct CheckRow {
    pub check: String,
    pub passed: u64,
    pub failed: u64,
    #[tabled(rename = "pass_rate_%", display = "float2")]
    pub pass_rate: f64,
}

#[derive(Tabled)]
pub struct StatusRow {
    pub status: String,
    pub count: u64,
}

fn float2(n: &f64) -> String {
    format!("{n:.2}")
}
