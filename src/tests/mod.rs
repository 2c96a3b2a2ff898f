
mod table_cases;
