use chrono::{DateTime, Utc};

use super::Registration;

pub const HEADERS: [&str; 7] = [
    "Full Name",
    "Email",
    "Phone",
    "Organization/Company",
    "Job Title/Role and Degree",
    "Questions/Comments",
    "Registration Date",
];

fn escape(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Spreadsheets read a leading `+` as a formula; the tab forces a text cell.
fn phone_cell(phone: &str) -> String {
    format!("\t{phone}")
}

fn row(registration: &Registration) -> String {
    let optional = |field: &Option<String>| field.clone().unwrap_or_default();
    [
        registration.full_name.clone(),
        registration.email.clone(),
        phone_cell(&registration.phone),
        optional(&registration.organization),
        optional(&registration.job_title_degree),
        optional(&registration.questions),
        registration
            .created_at
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
    ]
    .iter()
    .map(|cell| escape(cell))
    .collect::<Vec<_>>()
    .join(",")
}

pub fn to_csv(registrations: &[Registration]) -> String {
    std::iter::once(HEADERS.join(","))
        .chain(registrations.iter().map(row))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn file_name(today: DateTime<Utc>) -> String {
    format!("workshop-registrations-{}.csv", today.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RegistrationId;

    fn jane() -> Registration {
        Registration {
            id: RegistrationId("1".to_string()),
            full_name: "Jane \"JD\" Doe".to_string(),
            email: "jane@x.com".to_string(),
            phone: "+15550100".to_string(),
            organization: Some("ENS, Tetouan".to_string()),
            job_title_degree: None,
            questions: Some("Line one\nline two".to_string()),
            created_at: DateTime::from_timestamp(1_766_224_800, 0).unwrap(),
            confirmation_number: "MAIA-X-ABCD".to_string(),
        }
    }

    #[test]
    fn header_row_is_unquoted_and_ordered() {
        assert_eq!(
            to_csv(&[]),
            "Full Name,Email,Phone,Organization/Company,Job Title/Role and Degree,Questions/Comments,Registration Date"
        );
    }

    #[test]
    fn rows_quote_every_field_and_protect_phone() {
        let csv = to_csv(&[jane()]);
        let (_, body) = csv.split_once('\n').unwrap();
        assert_eq!(
            body,
            "\"Jane \"\"JD\"\" Doe\",\"jane@x.com\",\"\t+15550100\",\"ENS, Tetouan\",\"\",\"Line one\nline two\",\"2025-12-20 10:00:00 UTC\""
        );
    }

    #[test]
    fn file_name_carries_the_date() {
        let today = DateTime::from_timestamp(1_766_224_800, 0).unwrap();
        assert_eq!(file_name(today), "workshop-registrations-2025-12-20.csv");
    }
}
