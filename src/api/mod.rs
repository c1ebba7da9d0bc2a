pub mod composition_dto;
