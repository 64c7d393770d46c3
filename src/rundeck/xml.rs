//! Reading execution details out of Rundeck XML responses.
//!
//! Depending on the API version, the `<execution>` element is either the
//! document root or nested in `<result><executions>`. Both shapes are handled
//! by taking the first `<execution>` element found.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::types::{ExecutionId, ExecutionStatus};

use super::error::{Result, RundeckError};

/// The attributes of an `<execution>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionInfo {
    pub id: ExecutionId,
    pub status: Option<ExecutionStatus>,
}

fn malformed(message: impl Into<String>) -> RundeckError {
    RundeckError::MalformedResponse(message.into())
}

fn read_attributes(element: &BytesStart<'_>) -> Result<ExecutionInfo> {
    let mut id = None;
    let mut status = None;

    for attr in element.attributes() {
        let attr = attr.map_err(|e| malformed(format!("bad attribute: {e}")))?;
        let value = attr
            .unescape_value()
            .map_err(|e| malformed(format!("bad attribute value: {e}")))?;
        match attr.key.as_ref() {
            b"id" => id = Some(ExecutionId::new(value.into_owned())),
            b"status" => status = Some(ExecutionStatus::parse(&value)),
            _ => {}
        }
    }

    let id = id
        .filter(|id| !id.as_str().is_empty())
        .ok_or_else(|| malformed("<execution> element without an id"))?;
    Ok(ExecutionInfo { id, status })
}

/// Parses the first `<execution>` element of a response.
pub fn parse_execution(xml: &str) -> Result<ExecutionInfo> {
    let mut reader = Reader::from_str(xml);

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"execution" => {
                return read_attributes(&e);
            }
            Ok(Event::Eof) => return Err(malformed("no <execution> element in response")),
            Err(e) => {
                return Err(malformed(format!(
                    "invalid XML at position {}: {e}",
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }
}

/// Parses an execution status response; the `status` attribute is required.
pub fn parse_execution_status(xml: &str) -> Result<ExecutionStatus> {
    parse_execution(xml)?
        .status
        .ok_or_else(|| malformed("<execution> element without a status"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_executions_shape() {
        let xml = r#"<result success='true' apiversion='13'>
  <executions count='1'>
    <execution id='117' href='http://rd/execution/follow/117' status='running' project='puppet'>
      <user>deployer</user>
    </execution>
  </executions>
</result>"#;

        let info = parse_execution(xml).unwrap();

        assert_eq!(info.id, ExecutionId::new("117"));
        assert_eq!(info.status, Some(ExecutionStatus::Running));
    }

    #[test]
    fn parses_root_execution_shape() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<execution id="5" href="http://rd/api/20/execution/5" status="succeeded" project="puppet"/>"#;

        assert_eq!(parse_execution_status(xml).unwrap(), ExecutionStatus::Succeeded);
    }

    #[test]
    fn first_execution_wins() {
        let xml = "<executions><execution id='1' status='failed'/><execution id='2' status='running'/></executions>";
        let info = parse_execution(xml).unwrap();
        assert_eq!(info.id.as_str(), "1");
        assert_eq!(info.status, Some(ExecutionStatus::Failed));
    }

    #[test]
    fn other_statuses_are_kept_verbatim() {
        let xml = "<execution id='9' status='timedout'/>";
        assert_eq!(
            parse_execution_status(xml).unwrap(),
            ExecutionStatus::Other("timedout".to_string())
        );
    }

    #[test]
    fn missing_execution_is_malformed() {
        let err = parse_execution("<result error='true'><error><message>No such job</message></error></result>")
            .unwrap_err();
        assert!(matches!(err, RundeckError::MalformedResponse(_)));
    }

    #[test]
    fn missing_id_or_status_is_malformed() {
        assert!(parse_execution("<execution status='running'/>").is_err());
        assert!(parse_execution("<execution id='' status='running'/>").is_err());
        assert!(parse_execution_status("<execution id='3'/>").is_err());
    }

    #[test]
    fn broken_xml_is_malformed() {
        let err = parse_execution("<executions><execution id='1' status=running/>").unwrap_err();
        assert!(matches!(err, RundeckError::MalformedResponse(_)));
    }
}
