//! SQLite statement text for every [`Query`].
//!
//! Parameters are `?N`. Set-valued incident attributes are aggregated with
//! `json_group_array` so one row carries a whole incident.

use ims_core::query::{FieldReportColumn, IncidentColumn, Query};

macro_rules! incident_select {
  () => {
    "select
       i.NUMBER, i.CREATED, i.PRIORITY, i.STATE, i.SUMMARY,
       i.LOCATION_NAME, i.LOCATION_CONCENTRIC,
       i.LOCATION_RADIAL_HOUR, i.LOCATION_RADIAL_MINUTE,
       i.LOCATION_DESCRIPTION,
       (
         select json_group_array(r.RANGER_HANDLE)
         from INCIDENT__RANGER r
         where r.EVENT = i.EVENT and r.INCIDENT_NUMBER = i.NUMBER
       ),
       (
         select json_group_array(t.NAME)
         from INCIDENT__INCIDENT_TYPE it
         join INCIDENT_TYPE t on t.ID = it.INCIDENT_TYPE
         where it.EVENT = i.EVENT and it.INCIDENT_NUMBER = i.NUMBER
       ),
       (
         select json_group_array(f.NUMBER)
         from INCIDENT_REPORT f
         where f.EVENT = i.EVENT and f.INCIDENT_NUMBER = i.NUMBER
       )
     from INCIDENT i
     "
  };
}

macro_rules! incident_entries_select {
  () => {
    "select ire.INCIDENT_NUMBER, re.AUTHOR, re.TEXT, re.CREATED, re.GENERATED
     from INCIDENT__REPORT_ENTRY ire
     join REPORT_ENTRY re on re.ID = ire.REPORT_ENTRY
     "
  };
}

macro_rules! field_report_select {
  () => {
    "select NUMBER, CREATED, SUMMARY, INCIDENT_NUMBER
     from INCIDENT_REPORT
     "
  };
}

macro_rules! field_report_entries_select {
  () => {
    "select fre.INCIDENT_REPORT_NUMBER, re.AUTHOR, re.TEXT, re.CREATED, re.GENERATED
     from INCIDENT_REPORT__REPORT_ENTRY fre
     join REPORT_ENTRY re on re.ID = fre.REPORT_ENTRY
     "
  };
}

macro_rules! set_incident {
  ($column:literal) => {
    concat!(
      "update INCIDENT set ",
      $column,
      " = ?3 where EVENT = ?1 and NUMBER = ?2"
    )
  };
}

macro_rules! set_field_report {
  ($column:literal) => {
    concat!(
      "update INCIDENT_REPORT set ",
      $column,
      " = ?3 where EVENT = ?1 and NUMBER = ?2"
    )
  };
}

pub(crate) fn sql(query: Query) -> &'static str {
  match query {
    Query::SchemaVersion => "select VERSION from SCHEMA_INFO",

    Query::Events => "select NAME from EVENT order by ID",
    Query::CreateEvent => "insert into EVENT (NAME) values (?1)",
    Query::EventId => "select ID from EVENT where NAME = ?1",
    Query::EventAccess => {
      "select EXPRESSION from EVENT_ACCESS
       where EVENT = ?1 and MODE = ?2
       order by EXPRESSION"
    }
    Query::ClearEventAccess => {
      "delete from EVENT_ACCESS where EVENT = ?1 and MODE = ?2"
    }
    Query::AddEventAccess => {
      "insert into EVENT_ACCESS (EVENT, EXPRESSION, MODE) values (?1, ?2, ?3)"
    }

    Query::IncidentTypes => "select NAME, HIDDEN from INCIDENT_TYPE order by NAME",
    Query::VisibleIncidentTypes => {
      "select NAME, HIDDEN from INCIDENT_TYPE where HIDDEN = 0 order by NAME"
    }
    Query::IncidentTypeId => "select ID from INCIDENT_TYPE where NAME = ?1",
    Query::CreateIncidentType => {
      "insert into INCIDENT_TYPE (NAME, HIDDEN) values (?1, ?2)"
    }
    Query::SetIncidentTypeHidden => {
      "update INCIDENT_TYPE set HIDDEN = ?2 where NAME = ?1"
    }

    Query::ConcentricStreets => {
      "select ID, NAME from CONCENTRIC_STREET where EVENT = ?1"
    }
    Query::CreateConcentricStreet => {
      "insert into CONCENTRIC_STREET (EVENT, ID, NAME) values (?1, ?2, ?3)"
    }

    Query::CreateReportEntry => {
      "insert into REPORT_ENTRY (AUTHOR, TEXT, CREATED, GENERATED)
       values (?1, ?2, ?3, ?4)
       returning ID"
    }

    Query::Incidents => {
      concat!(incident_select!(), "where i.EVENT = ?1 order by i.NUMBER")
    }
    Query::Incident => {
      concat!(incident_select!(), "where i.EVENT = ?1 and i.NUMBER = ?2")
    }
    Query::IncidentsReportEntries => {
      concat!(incident_entries_select!(), "where ire.EVENT = ?1")
    }
    Query::IncidentReportEntries => concat!(
      incident_entries_select!(),
      "where ire.EVENT = ?1 and ire.INCIDENT_NUMBER = ?2"
    ),
    Query::CurrentIncidentState => {
      "select STATE from INCIDENT where EVENT = ?1 and NUMBER = ?2"
    }
    Query::NextIncidentNumber => {
      "select coalesce(max(NUMBER), 0) + 1 from INCIDENT where EVENT = ?1"
    }
    Query::CreateIncident => {
      "insert into INCIDENT (
         EVENT, NUMBER, CREATED, PRIORITY, STATE, SUMMARY,
         LOCATION_NAME, LOCATION_CONCENTRIC,
         LOCATION_RADIAL_HOUR, LOCATION_RADIAL_MINUTE,
         LOCATION_DESCRIPTION
       ) values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"
    }
    Query::AttachRangerHandleToIncident => {
      "insert into INCIDENT__RANGER (EVENT, INCIDENT_NUMBER, RANGER_HANDLE)
       values (?1, ?2, ?3)"
    }
    Query::ClearIncidentRangerHandles => {
      "delete from INCIDENT__RANGER where EVENT = ?1 and INCIDENT_NUMBER = ?2"
    }
    Query::AttachIncidentTypeToIncident => {
      "insert into INCIDENT__INCIDENT_TYPE (EVENT, INCIDENT_NUMBER, INCIDENT_TYPE)
       values (?1, ?2, ?3)"
    }
    Query::ClearIncidentTypes => {
      "delete from INCIDENT__INCIDENT_TYPE
       where EVENT = ?1 and INCIDENT_NUMBER = ?2"
    }
    Query::AttachReportEntryToIncident => {
      "insert into INCIDENT__REPORT_ENTRY (EVENT, INCIDENT_NUMBER, REPORT_ENTRY)
       values (?1, ?2, ?3)"
    }
    Query::SetIncidentColumn(column) => match column {
      IncidentColumn::Priority => set_incident!("PRIORITY"),
      IncidentColumn::State => set_incident!("STATE"),
      IncidentColumn::Summary => set_incident!("SUMMARY"),
      IncidentColumn::LocationName => set_incident!("LOCATION_NAME"),
      IncidentColumn::LocationConcentric => set_incident!("LOCATION_CONCENTRIC"),
      IncidentColumn::LocationRadialHour => set_incident!("LOCATION_RADIAL_HOUR"),
      IncidentColumn::LocationRadialMinute => {
        set_incident!("LOCATION_RADIAL_MINUTE")
      }
      IncidentColumn::LocationDescription => {
        set_incident!("LOCATION_DESCRIPTION")
      }
    },

    Query::FieldReports => {
      concat!(field_report_select!(), "where EVENT = ?1 order by NUMBER")
    }
    Query::FieldReport => {
      concat!(field_report_select!(), "where EVENT = ?1 and NUMBER = ?2")
    }
    Query::FieldReportsAttachedToIncident => concat!(
      field_report_select!(),
      "where EVENT = ?1 and INCIDENT_NUMBER = ?2 order by NUMBER"
    ),
    Query::DetachedFieldReports => concat!(
      field_report_select!(),
      "where EVENT = ?1 and INCIDENT_NUMBER is null order by NUMBER"
    ),
    Query::FieldReportsReportEntries => {
      concat!(field_report_entries_select!(), "where fre.EVENT = ?1")
    }
    Query::FieldReportReportEntries => concat!(
      field_report_entries_select!(),
      "where fre.EVENT = ?1 and fre.INCIDENT_REPORT_NUMBER = ?2"
    ),
    Query::FieldReportAttachment => {
      "select INCIDENT_NUMBER from INCIDENT_REPORT
       where EVENT = ?1 and NUMBER = ?2"
    }
    Query::NextFieldReportNumber => {
      "select coalesce(max(NUMBER), 0) + 1 from INCIDENT_REPORT"
    }
    Query::CreateFieldReport => {
      "insert into INCIDENT_REPORT (EVENT, NUMBER, CREATED, SUMMARY, INCIDENT_NUMBER)
       values (?1, ?2, ?3, ?4, ?5)"
    }
    Query::AttachReportEntryToFieldReport => {
      "insert into INCIDENT_REPORT__REPORT_ENTRY (
         EVENT, INCIDENT_REPORT_NUMBER, REPORT_ENTRY
       ) values (?1, ?2, ?3)"
    }
    Query::SetFieldReportColumn(column) => match column {
      FieldReportColumn::Summary => set_field_report!("SUMMARY"),
      FieldReportColumn::IncidentNumber => set_field_report!("INCIDENT_NUMBER"),
    },
  }
}

#[cfg(test)]
mod tests {
  use ims_core::query::highest_parameter;

  use super::*;

  #[test]
  fn every_query_binds_its_declared_parameters() {
    for query in Query::all() {
      let text = sql(query);
      assert_eq!(
        highest_parameter(text, '?'),
        query.parameter_count(),
        "{query:?}: {text}"
      );
      assert!(!text.contains('$'), "{query:?} uses the wrong placeholder style");
    }
  }
}
